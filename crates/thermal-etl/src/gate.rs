//! Single-flight update gate over the status record.
//!
//! The gate is checked twice: once before any expensive work, and again
//! right before a run commits to a source. The second check claims the
//! flag with a compare-and-set so two runs passing the first check at the
//! same time cannot both proceed.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info};

use storage::{StatusDocument, StatusField, StatusStore};

use crate::error::EtlResult;

/// Idle/Updating state machine backed by `isUpdating`.
#[derive(Clone)]
pub struct UpdateGate {
    status: StatusStore,
}

impl UpdateGate {
    pub fn new(status: StatusStore) -> Self {
        Self { status }
    }

    /// Advisory first check. Returns the snapshot when idle, `None` when
    /// another run holds the gate.
    pub async fn precheck(&self) -> EtlResult<Option<StatusDocument>> {
        let snapshot = self.status.fetch().await?;
        if snapshot.is_updating {
            info!("Another update is in progress");
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Re-read the record and claim the gate. `None` means another run got
    /// there first; nothing was written in that case.
    pub async fn acquire(&self) -> EtlResult<Option<UpdateLease>> {
        if self.status.fetch().await?.is_updating {
            info!("Another update started while resolving the source");
            return Ok(None);
        }
        if !self.status.claim().await? {
            info!("Lost the update claim to a concurrent run");
            return Ok(None);
        }
        info!("Update gate acquired");
        Ok(Some(UpdateLease {
            status: self.status.clone(),
        }))
    }
}

/// Proof of holding the gate. Release happens through [`UpdateLease::scope`].
pub struct UpdateLease {
    status: StatusStore,
}

impl UpdateLease {
    /// Run `body` while holding the gate, then set `isUpdating` back to
    /// false whatever the outcome, including a panic inside `body`.
    ///
    /// A release failure is only reported when `body` itself succeeded.
    pub async fn scope<T, Fut>(self, body: Fut) -> EtlResult<T>
    where
        Fut: Future<Output = EtlResult<T>>,
    {
        let outcome = AssertUnwindSafe(body).catch_unwind().await;
        let released = self.status.set_field(StatusField::IsUpdating, false).await;

        match &released {
            Ok(()) => info!("Update gate released"),
            Err(e) => error!(error = %e, "Failed to release update gate"),
        }

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(value)
            }
            Ok(Err(e)) => Err(e),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
