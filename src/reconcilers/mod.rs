//! Reconcilers for Vault identity CRDs
//!
//! This module contains the business logic for reconciling each CRD type.
//! Reconcilers are responsible for:
//! - Validating CRD specs
//! - Creating, updating, reading and deleting objects in Vault
//! - Updating resource status

pub mod identity_group;
pub mod status;
