//! Rule set version reporting.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::Version;

/// Log and record every version published by the rule store until shutdown
/// or until the store is dropped.
pub fn spawn_version_reporter(
    mut versions: watch::Receiver<Version>,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        metrics::record_rule_set_version(*versions.borrow_and_update());
        loop {
            tokio::select! {
                changed = versions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let version = *versions.borrow_and_update();
                    metrics::record_rule_set_version(version);
                    tracing::info!(version = %version, "Rule set version active");
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Version reporter stopped");
    })
}
