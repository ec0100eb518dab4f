//! VaultIdentityGroup controller
//!
//! Watches VaultIdentityGroup resources and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::VaultIdentityGroup;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::identity_group::{
    self, GroupRecord, GroupState, ReadOutcome, SyncAction, TrackedGroup,
};
use crate::reconcilers::status;

/// Finalizer name for VaultIdentityGroup resources
const FINALIZER_NAME: &str = "vault.oso.sh/identity-group-finalizer";

const KIND: &str = "VaultIdentityGroup";

/// Requeue delay after the group vanished from Vault
const DRIFT_REQUEUE: Duration = Duration::from_secs(5);

/// Requeue delay after a read was skipped on an expired credential
const SKIPPED_REQUEUE: Duration = Duration::from_secs(60);

/// Requeue delay after a validation failure
const INVALID_REQUEUE: Duration = Duration::from_secs(300);

/// Requeue delay after a failed call against Vault
const REMOTE_ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Run the VaultIdentityGroup controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<VaultIdentityGroup> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("VaultIdentityGroup CRD not installed: {}", e);
        return;
    }

    info!("Starting VaultIdentityGroup controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled VaultIdentityGroup"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<VaultIdentityGroup>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<VaultIdentityGroup> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(group) => apply(group, ctx.clone()).await,
            FinalizerEvent::Cleanup(group) => cleanup(group, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Apply reconciliation (create/update/refresh)
async fn apply(group: Arc<VaultIdentityGroup>, ctx: Arc<Context>) -> Result<Action> {
    let name = group.name_any();
    let namespace = group.namespace().unwrap_or_else(|| "default".to_string());
    let generation = group.metadata.generation;

    info!(
        name = %name,
        namespace = %namespace,
        generation = generation.unwrap_or(0),
        "Reconciling VaultIdentityGroup"
    );

    let desired = GroupRecord::from(&group.spec);
    if let Err(e) = identity_group::validate(&desired) {
        warn!(error = %e, "Validation failed");
        let body = status::failed_status(generation, "ValidationFailed", &e.to_string(), None);
        status::patch_status(&group, &ctx.client, &namespace, body).await?;
        return Ok(Action::requeue(INVALID_REQUEUE));
    }

    let current = group.status.as_ref();
    let tracked = TrackedGroup::from_status(current);
    let spec_changed = current.and_then(|s| s.observed_generation) != generation;

    if tracked.is_none() && current.and_then(|s| s.phase.as_ref()).is_none() {
        status::patch_status(&group, &ctx.client, &namespace, status::pending_status(generation))
            .await?;
    }

    let mut state = GroupState::untracked(desired);
    let sync = identity_group::sync(ctx.vault.as_ref(), &mut state, tracked, spec_changed).await;
    let report = match sync {
        Ok(report) => report,
        Err(e) => {
            error!(name = %name, error = %e, "Failed to sync identity group with Vault");
            metrics::GROUP_OPERATIONS
                .with_label_values(&["failed", &namespace])
                .inc();
            // observedGeneration is cleared so the next attempt re-sends the spec.
            // An id assigned before the failure is kept so the group is not orphaned.
            let body = status::failed_status(None, "VaultError", &e.to_string(), Some(&state));
            status::patch_status(&group, &ctx.client, &namespace, body).await?;
            return Err(e);
        }
    };

    metrics::GROUP_OPERATIONS
        .with_label_values(&[report.action.as_str(), &namespace])
        .inc();

    match report.outcome {
        ReadOutcome::Gone => {
            warn!(name = %name, "Identity group missing from Vault, will re-create");
            metrics::DRIFT_DETECTED.with_label_values(&[&namespace]).inc();
            let body = status::drifted_status(generation, "Identity group was not found in Vault");
            status::patch_status(&group, &ctx.client, &namespace, body).await?;
            Ok(Action::requeue(DRIFT_REQUEUE))
        }
        ReadOutcome::Skipped if report.action == SyncAction::Refreshed => {
            Ok(Action::requeue(SKIPPED_REQUEUE))
        }
        _ => {
            let message = match &report.action {
                SyncAction::Replaced { previous_id } => {
                    format!("Identity group replaced (previous id {})", previous_id)
                }
                _ => "Identity group is in sync with Vault".to_string(),
            };
            let body = status::ready_status(&state, current, generation, &message);
            status::patch_status(&group, &ctx.client, &namespace, body).await?;
            Ok(Action::requeue(ctx.resync_interval))
        }
    }
}

/// Cleanup when resource is being deleted
async fn cleanup(group: Arc<VaultIdentityGroup>, ctx: Arc<Context>) -> Result<Action> {
    let name = group.name_any();
    info!(name = %name, "Cleaning up VaultIdentityGroup");

    if let Some(tracked) = TrackedGroup::from_status(group.status.as_ref()) {
        let vault = ctx.vault.as_ref();
        if identity_group::exists(vault, &tracked.id, &group.spec.name).await? {
            identity_group::delete(vault, &tracked.id).await?;
        } else {
            info!(name = %name, id = %tracked.id, "Identity group already absent from Vault");
        }
    }

    metrics::CLEANUPS.with_label_values(&[KIND]).inc();

    Ok(Action::await_change())
}

/// Error policy for the controller
fn error_policy(obj: Arc<VaultIdentityGroup>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(requeue_after(error))
}

fn requeue_after(error: &Error) -> Duration {
    match error {
        Error::Config(_) | Error::Validation(_) => INVALID_REQUEUE,
        e if e.is_remote() => REMOTE_ERROR_REQUEUE,
        _ => Duration::from_secs(30),
    }
}
