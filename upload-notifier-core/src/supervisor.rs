// process wiring - filesystem watch, event ingestion and the hourly scheduler, plus shutdown

use crate::buffer::NotificationBuffer;
use crate::config::Settings;
use crate::error::WatchError;
use crate::events::{EventClassifier, WatchEvent, WatchEventKind};
use crate::notifier::{Notifier, TelegramNotifier};
use crate::scheduler::Scheduler;
use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// raw notify results waiting for the ingest task. the watcher thread blocks when full
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// owns the shared buffer and runs the watch and scheduler side by side
pub struct Supervisor {
    settings: Settings,
    notifier: Arc<dyn Notifier>,
    buffer: NotificationBuffer,
}

impl Supervisor {
    pub fn new(settings: Settings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings,
            notifier,
            buffer: NotificationBuffer::new(),
        }
    }

    /// build the telegram client once and wrap it in a supervisor
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let notifier = TelegramNotifier::new(
            settings.telegram_token.clone(),
            settings.telegram_api_url.clone(),
        )
        .context("failed to build telegram client")?;
        Ok(Self::new(settings, Arc::new(notifier)))
    }

    /// handle to the pending lines, shared with the running tasks
    pub fn buffer(&self) -> NotificationBuffer {
        self.buffer.clone()
    }

    /// run until `shutdown` resolves or the watch fails.
    ///
    /// on shutdown the watcher is dropped first so no new events arrive, then both tasks are
    /// cancelled and awaited. a watch failure is returned as an error.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Supervisor {
            settings,
            notifier,
            buffer,
        } = self;
        let root = settings.watch_dir.clone();

        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>(EVENT_CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // receiver gone means we are shutting down
                let _ = event_tx.blocking_send(res);
            },
            Config::default(),
        )
        .map_err(|source| WatchError::Start {
            path: root.clone(),
            source,
        })?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Start {
                path: root.clone(),
                source,
            })?;
        info!("Watching directory: {}", root.display());

        let cancel = CancellationToken::new();
        let classifier = EventClassifier::new(Arc::new(settings.patterns.clone()), buffer.clone());

        let scheduler = Scheduler::new(buffer, notifier, settings.chat_id, settings.job_name)
            .requeue_failed(settings.requeue_failed);
        let scheduler_task = tokio::spawn(scheduler.run(cancel.child_token()));
        let mut ingest_task = tokio::spawn(ingest(event_rx, classifier, root, cancel.clone()));

        let early_exit = tokio::select! {
            _ = shutdown => {
                info!("interrupt received, shutting down");
                None
            }
            joined = &mut ingest_task => Some(joined),
        };

        drop(watcher);
        cancel.cancel();

        let ingest_result = match early_exit {
            Some(joined) => joined,
            None => ingest_task.await,
        };
        scheduler_task.await.context("scheduler task panicked")?;
        ingest_result.context("event task panicked")??;

        info!("shutdown complete");
        Ok(())
    }
}

/// feed watcher output through the classifier until cancelled
async fn ingest(
    mut events: mpsc::Receiver<notify::Result<Event>>,
    classifier: EventClassifier,
    root: PathBuf,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            received = events.recv() => received,
        };

        match received {
            Some(Ok(event)) => {
                for watch_event in WatchEvent::from_notify(&event) {
                    if is_root_removal(&watch_event, &root) {
                        return Err(WatchError::RootRemoved(root));
                    }
                    classifier.classify(&watch_event);
                }
            }
            Some(Err(e)) => {
                if !root.is_dir() {
                    error!("watch error: {e}");
                    return Err(WatchError::RootRemoved(root));
                }
                warn!("watch error: {e}");
            }
            None if cancel.is_cancelled() => return Ok(()),
            None => return Err(WatchError::StreamClosed),
        }
    }
}

fn is_root_removal(event: &WatchEvent, root: &Path) -> bool {
    if event.kind != WatchEventKind::Deleted || event.path.as_path() != root {
        return false;
    }
    debug!("delete reported for watch root {}", root.display());
    !root.exists()
}

/// resolves on ctrl-c, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternList;
    use crate::scheduler::tests::RecordingNotifier;
    use std::time::Duration;

    fn settings(dir: &Path) -> Settings {
        Settings {
            telegram_token: "t".into(),
            chat_id: "1".into(),
            watch_dir: dir.to_path_buf(),
            job_name: "job".into(),
            patterns: PatternList::compile([("PATTERN_1", r"^(\w+)\.bak$")]).unwrap(),
            telegram_api_url: "http://127.0.0.1:9".into(),
            requeue_failed: false,
        }
    }

    #[test]
    fn root_removal_needs_matching_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gone");
        assert!(is_root_removal(&WatchEvent::deleted(&root).directory(), &root));
        assert!(!is_root_removal(&WatchEvent::deleted(root.join("f")), &root));
        assert!(!is_root_removal(&WatchEvent::created(&root), &root));
        // still there: a stray event, not a removal
        assert!(!is_root_removal(
            &WatchEvent::deleted(dir.path()).directory(),
            dir.path()
        ));
    }

    #[tokio::test]
    async fn ingest_classifies_until_cancelled() {
        let root = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let buffer = NotificationBuffer::new();
        let patterns = PatternList::compile([("PATTERN_1", r"^(\w+)\.bak$")]).unwrap();
        let classifier = EventClassifier::new(Arc::new(patterns), buffer.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(ingest(
            rx,
            classifier,
            root.path().to_path_buf(),
            cancel.clone(),
        ));

        for kind in [
            notify::EventKind::Create(notify::event::CreateKind::File),
            notify::EventKind::Remove(notify::event::RemoveKind::File),
        ] {
            tx.send(Ok(Event::new(kind).add_path(PathBuf::from("/cache/db.bak"))))
                .await
                .unwrap();
        }
        tx.send(Err(notify::Error::generic("spurious"))).await.ok();

        tokio::time::timeout(Duration::from_secs(5), async {
            while buffer.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(buffer.snapshot()[0].canonical_name, "db");
    }

    #[tokio::test]
    async fn closed_stream_is_fatal() {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>(1);
        drop(tx);
        let classifier = EventClassifier::new(Arc::default(), NotificationBuffer::new());
        let err = ingest(rx, classifier, PathBuf::from("/"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::StreamClosed));
    }

    #[tokio::test]
    async fn shutdown_returns_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let supervisor = Supervisor::new(settings(dir.path()), notifier.clone());

        tokio::time::timeout(Duration::from_secs(5), supervisor.run_until(async {}))
            .await
            .expect("no waiting out the hour")
            .unwrap();
        assert!(notifier.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("missing");
        let supervisor = Supervisor::new(settings(&gone), Arc::new(RecordingNotifier::default()));
        let err = supervisor
            .run_until(std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WatchError>(),
            Some(WatchError::Start { .. })
        ));
    }
}
