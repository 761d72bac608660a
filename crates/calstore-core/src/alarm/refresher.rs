//! Background lease refresher.
//!
//! One refresher runs per acquisition batch. Every tick it re-stamps all
//! claims still present in the batch's [`RefreshRegistry`], and it exits on
//! the first tick that finds the registry empty.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use super::{registry::RefreshRegistry, store::TriggerStore};
use crate::clock::Clock;

/// Settings of one refresher task.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// Context of the batch, used for log correlation.
    pub context_id: i32,
    /// Fixed delay between ticks.
    pub interval: Duration,
    /// Maximum claims per refresh statement.
    pub chunk_size: usize,
}

/// Spawn a refresher for `registry`.
///
/// Refresh failures are logged and retried on the next tick; they never end
/// the task.
pub fn spawn_refresher<S>(
    store: Arc<S>,
    registry: RefreshRegistry,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
) -> JoinHandle<()>
where
    S: TriggerStore + ?Sized + 'static,
{
    let chunk_size = settings.chunk_size.max(1);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(settings.interval).await;

            if registry.is_empty() {
                tracing::debug!(
                    context_id = settings.context_id,
                    "No claims left to refresh, stopping lease refresher"
                );
                break;
            }

            let now = clock.now_millis();
            for chunk in registry.snapshot().chunks(chunk_size) {
                match store.refresh_claims(chunk, now).await {
                    Ok(refreshed) => tracing::debug!(
                        context_id = settings.context_id,
                        chunk_size = chunk.len(),
                        refreshed,
                        "Refreshed alarm trigger claims"
                    ),
                    Err(e) => tracing::warn!(
                        context_id = settings.context_id,
                        chunk_size = chunk.len(),
                        error = %e,
                        "Failed to refresh alarm trigger claims"
                    ),
                }
            }
        }
    })
}
