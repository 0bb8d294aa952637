/*!
 * Background scan worker.
 *
 * One worker runs per registered adapter. It owns the adapter's local
 * native-id map, ticks on a fixed period, accepts out-of-band refresh
 * commands, and stops through a signal that is awaited, so adapter
 * teardown is deterministic: no tick runs concurrently with or after
 * it.
 */
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use benchlink_core::error::{Error, Result};
use benchlink_core::types::{Identity, ResourceId};
use benchlink_core::utils::with_timeout;

use crate::adapter::InterfaceAdapter;
use crate::registry::ResourceRegistry;

/// One tracked entry of the adapter's local map
struct Tracked {
    identity: Identity,
    id: ResourceId,
}

/// Handle to a running scan worker
pub(crate) struct AdapterHandle {
    adapter: Arc<dyn InterfaceAdapter>,
    refresh_tx: mpsc::Sender<oneshot::Sender<()>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AdapterHandle {
    /// Spawn the scan worker for an opened adapter
    pub(crate) fn spawn(
        registry: ResourceRegistry,
        adapter: Arc<dyn InterfaceAdapter>,
        period: Duration,
        enumerate_timeout: Duration,
    ) -> Self {
        let (refresh_tx, mut refresh_rx) = mpsc::channel::<oneshot::Sender<()>>(8);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let worker_adapter = adapter.clone();
        let task = tokio::spawn(async move {
            let mut known: HashMap<String, Tracked> = HashMap::new();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        scan_once(&registry, &worker_adapter, &mut known, enumerate_timeout).await;
                    }
                    command = refresh_rx.recv() => match command {
                        Some(ack) => {
                            scan_once(&registry, &worker_adapter, &mut known, enumerate_timeout).await;
                            let _ = ack.send(());
                        }
                        None => break,
                    },
                }
            }

            debug!(adapter = %worker_adapter.name(), "Scan worker stopped");
        });

        Self {
            adapter,
            refresh_tx,
            stop_tx,
            task,
        }
    }

    /// Run one out-of-band scan and wait for it to complete
    pub(crate) async fn refresh(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.refresh_tx
            .send(ack_tx)
            .await
            .map_err(|_| Error::other("scan worker is not running"))?;
        ack_rx
            .await
            .map_err(|_| Error::other("scan worker stopped during refresh"))
    }

    /// Signal the worker to stop and wait for its current tick to
    /// finish. Returns the adapter so the caller can close it.
    pub(crate) async fn stop(self) -> Arc<dyn InterfaceAdapter> {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(adapter = %self.adapter.name(), "Scan worker join failed: {}", e);
        }
        self.adapter
    }
}

/// One scan tick: enumerate, diff against the local map, dispatch the
/// changes, confirm survivors.
///
/// On enumeration failure the local map is left untouched for this
/// tick; when the tick completes normally the local map equals the new
/// enumeration exactly.
async fn scan_once(
    registry: &ResourceRegistry,
    adapter: &Arc<dyn InterfaceAdapter>,
    known: &mut HashMap<String, Tracked>,
    enumerate_timeout: Duration,
) {
    let observed = match with_timeout(enumerate_timeout, adapter.enumerate()).await {
        Ok(observed) => observed,
        Err(e) => {
            warn!(
                adapter = %adapter.name(),
                "Enumeration failed, keeping previous view: {}",
                e
            );
            return;
        }
    };

    // Stale entries first: ids that vanished, and ids whose identifying
    // tuple changed (a changed tuple is a new device).
    let stale: Vec<String> = known
        .iter()
        .filter(|(native_id, tracked)| match observed.get(*native_id) {
            None => true,
            Some(identity) => *identity != tracked.identity,
        })
        .map(|(native_id, _)| native_id.clone())
        .collect();

    for native_id in stale {
        if let Some(tracked) = known.remove(&native_id) {
            if let Err(e) = registry.purge_resource(tracked.id).await {
                warn!(
                    adapter = %adapter.name(),
                    native_id = %native_id,
                    "Purge failed: {}",
                    e
                );
            }
        }
    }

    for (native_id, identity) in &observed {
        if !known.contains_key(native_id) {
            match registry
                .admit_resource(adapter.name(), native_id, identity.clone())
                .await
            {
                Ok(id) => {
                    known.insert(
                        native_id.clone(),
                        Tracked {
                            identity: identity.clone(),
                            id,
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        adapter = %adapter.name(),
                        native_id = %native_id,
                        "Admission failed: {}",
                        e
                    );
                }
            }
        }
    }

    // Everything the scan still reports is confirmed present.
    for tracked in known.values() {
        if let Err(e) = registry.confirm_resource(tracked.id).await {
            warn!(adapter = %adapter.name(), "Confirmation failed: {}", e);
        }
    }
}
