//! Vault Identity Operator
//!
//! This operator manages HashiCorp Vault identity groups from Kubernetes
//! using Custom Resource Definitions (CRDs).

pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod vault;

pub use error::{Error, Result};
