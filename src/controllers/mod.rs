//! Kubernetes controllers for Vault identity CRDs
//!
//! This module contains the controller implementations that watch for CRD changes
//! and trigger reconciliation.

mod identity_group_controller;

pub use identity_group_controller::run as run_identity_group_controller;

use std::sync::Arc;
use std::time::Duration;

use kube::Client;

use crate::vault::Logical;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Vault logical API
    pub vault: Arc<dyn Logical>,
    /// Interval between drift checks of groups that are in sync
    pub resync_interval: Duration,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, vault: Arc<dyn Logical>, resync_interval: Duration) -> Self {
        Self {
            client,
            vault,
            resync_interval,
        }
    }
}
