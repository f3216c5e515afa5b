// filesystem event classification - turns raw watcher events into log lines and buffered names

use crate::buffer::{BufferedLine, NotificationBuffer};
use crate::patterns::PatternList;
use chrono::{DateTime, Local, TimeZone};
use notify::event::{CreateKind, RemoveKind};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Deleted,
}

/// a create or delete seen under the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub is_directory: bool,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            kind: WatchEventKind::Created,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            kind: WatchEventKind::Deleted,
        }
    }

    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    /// map a notify event onto zero or more watch events. modifications, renames and
    /// access events are not part of the upload lifecycle and are dropped
    pub fn from_notify(event: &notify::Event) -> Vec<WatchEvent> {
        let (kind, folder_hint) = match event.kind {
            notify::EventKind::Create(create) => (
                WatchEventKind::Created,
                match create {
                    CreateKind::Folder => Some(true),
                    CreateKind::File => Some(false),
                    _ => None,
                },
            ),
            notify::EventKind::Remove(remove) => (
                WatchEventKind::Deleted,
                match remove {
                    RemoveKind::Folder => Some(true),
                    RemoveKind::File => Some(false),
                    _ => None,
                },
            ),
            _ => return Vec::new(),
        };

        event
            .paths
            .iter()
            .map(|path| WatchEvent {
                path: path.clone(),
                // a removed path can no longer be inspected, so it counts as a file
                is_directory: folder_hint.unwrap_or_else(|| path.is_dir()),
                kind,
            })
            .collect()
    }

    /// final path component, or the whole path when there is none
    pub fn basename(&self) -> String {
        basename(&self.path)
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// what the classifier did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// directory events
    Ignored,
    /// a file appeared in the cache, upload in progress
    Started { name: String },
    /// a file left the cache. `buffered` is set when a pattern produced a canonical name
    Finished {
        name: String,
        buffered: Option<BufferedLine>,
    },
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Ignored => write!(f, "ignored"),
            Classification::Started { name } => write!(f, "{name} has started uploading."),
            Classification::Finished { name, .. } => write!(f, "{name} has finished uploading."),
        }
    }
}

/// logs upload start/finish and appends finished uploads with a canonical name to the buffer
#[derive(Debug, Clone)]
pub struct EventClassifier {
    patterns: Arc<PatternList>,
    buffer: NotificationBuffer,
}

impl EventClassifier {
    pub fn new(patterns: Arc<PatternList>, buffer: NotificationBuffer) -> Self {
        Self { patterns, buffer }
    }

    pub fn buffer(&self) -> &NotificationBuffer {
        &self.buffer
    }

    pub fn classify(&self, event: &WatchEvent) -> Classification {
        self.classify_at(event, &Local::now())
    }

    /// same as [`classify`](Self::classify) with an explicit clock reading for the timestamp
    pub fn classify_at<Tz>(&self, event: &WatchEvent, now: &DateTime<Tz>) -> Classification
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        if event.is_directory {
            debug!("ignoring directory event for {}", event.path.display());
            return Classification::Ignored;
        }

        let name = event.basename();
        let outcome = match event.kind {
            WatchEventKind::Created => Classification::Started { name },
            WatchEventKind::Deleted => {
                let buffered = self
                    .patterns
                    .extract_canonical_name(&name)
                    .map(|canonical| BufferedLine::at(now, canonical));
                if let Some(line) = &buffered {
                    debug!("buffering '{}'", line);
                    self.buffer.push(line.clone());
                }
                Classification::Finished { name, buffered }
            }
        };

        info!("{}", outcome);
        outcome
    }
}
