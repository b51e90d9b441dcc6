//! Reloads endpoint definitions when files under the definitions root
//! change.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use portico_registry::EndpointRegistry;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Handle to a running definition watcher; dropping it stops the watcher.
pub struct DefinitionWatcher {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl DefinitionWatcher {
    /// Watches the registry's root recursively and runs a full reload after
    /// each debounced burst of changes.
    pub fn start(registry: Arc<EndpointRegistry>, debounce: Duration) -> Self {
        let root: PathBuf = registry.root().to_path_buf();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut debouncer = match new_debouncer(debounce, notify_tx) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to create definition watcher: {e}");
                    return;
                }
            };

            if let Err(e) = debouncer.watcher().watch(&root, RecursiveMode::Recursive) {
                error!(path = %root.display(), "Failed to watch definitions directory: {e}");
                return;
            }

            info!(path = %root.display(), "Watching endpoint definitions");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Definition watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        let mut changed = false;
                        while let Ok(events) = notify_rx.try_recv() {
                            match events {
                                Ok(events) => {
                                    for event in &events {
                                        debug!(path = %event.path.display(), "Definition file changed");
                                    }
                                    changed |= !events.is_empty();
                                }
                                Err(e) => warn!("Definition watcher error: {e:?}"),
                            }
                        }
                        if changed {
                            let report = registry.reload(None).await;
                            info!(counts = ?report.counts, conflicts = report.conflicts.len(), "Definitions reloaded after change");
                        }
                    }
                }
            }
        });

        Self {
            handle: Some(handle),
            shutdown: Some(shutdown_tx),
        }
    }

    /// Stops the watcher and waits for its task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DefinitionWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_registry::{DEFINITION_FILE, EndpointGroup};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_change_triggers_reload() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Proxy")).unwrap();
        let registry = Arc::new(EndpointRegistry::new(tmp.path()));
        assert!(registry.get(EndpointGroup::Proxy).await.is_empty());

        let watcher = DefinitionWatcher::start(registry.clone(), Duration::from_millis(100));
        sleep(Duration::from_millis(200)).await;

        let dir = tmp.path().join("Proxy").join("Orders");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(DEFINITION_FILE),
            r#"{"Type": "Standard", "Url": "http://backend/svc/Orders", "Methods": ["GET"]}"#,
        )
        .unwrap();

        let reloaded = timeout(Duration::from_secs(10), async {
            loop {
                if registry.get(EndpointGroup::Proxy).await.contains_key("Orders") {
                    break;
                }
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(reloaded.is_ok(), "definition change was not picked up");

        watcher.stop().await;
    }
}
