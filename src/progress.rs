//! Progress event channel.
//!
//! Long-running steps report what they are doing through a [`Progress`]
//! sender. The receiving side decides how to display updates; producers never
//! format for a particular surface. A sender can be re-scoped so that events
//! from a nested step carry the label of the enclosing step
//! (e.g. `Video for scene 2/3`).

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

/// A single progress event emitted by a pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Free-form status line for the current step.
    Status(String),
    /// A rate-limited call is about to be retried after `delay`.
    RateLimited {
        attempt: u32,
        max_retries: u32,
        delay: Duration,
    },
    /// A long-running video operation was polled.
    Polling { elapsed: Duration },
    /// A scene finished generating and is available for playback.
    SceneReady { scene: usize, total: usize },
    /// Export reached the given scene.
    Exporting { scene: usize, total: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Status(message) => f.write_str(message),
            ProgressEvent::RateLimited {
                attempt,
                max_retries,
                delay,
            } => write!(
                f,
                "Rate limit reached. Retrying attempt {}/{} in {}s...",
                attempt,
                max_retries,
                format_secs(*delay)
            ),
            ProgressEvent::Polling { elapsed } => write!(
                f,
                "Generating video... ({}s elapsed)",
                format_secs(*elapsed)
            ),
            ProgressEvent::SceneReady { scene, total } => {
                write!(f, "Scene {}/{} ready", scene, total)
            }
            ProgressEvent::Exporting { scene, total } => {
                write!(f, "Exporting scene {}/{}...", scene, total)
            }
        }
    }
}

fn format_secs(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        (millis / 1000).to_string()
    } else {
        format!("{:.1}", duration.as_secs_f64())
    }
}

/// An event together with the scope label it was emitted under.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub scope: Option<String>,
    pub event: ProgressEvent,
}

impl fmt::Display for ProgressUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}: {}", scope, self.event),
            None => write!(f, "{}", self.event),
        }
    }
}

/// Sending half of a progress channel.
///
/// Cloning is cheap. Sending never blocks and never fails: once the receiver
/// is gone, events are silently dropped.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    scope: Option<String>,
}

impl Progress {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                scope: None,
            },
            rx,
        )
    }

    /// A sender with nobody listening.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            scope: None,
        }
    }

    /// A sender whose events carry `label` as their scope.
    pub fn scoped(&self, label: impl Into<String>) -> Self {
        Self {
            tx: self.tx.clone(),
            scope: Some(label.into()),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        log::debug!("progress: {}", event);
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressUpdate {
                scope: self.scope.clone(),
                event,
            });
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Status(message.into()));
    }
}

/// Drain every update currently queued on `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}
