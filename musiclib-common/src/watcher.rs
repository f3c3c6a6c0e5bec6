//! Debounced database file watching
//!
//! The maintenance scripts rewrite musiclib.dsv via temp-file-and-rename,
//! which fires several change notifications in quick succession and can
//! invalidate the underlying watch handle. This module coalesces each
//! burst into a single reload and re-attaches the watch after every
//! notification, so one missed re-attach never silently stops updates.

use std::path::Path;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::Result;
use crate::library::Library;

/// Quiescence window before a burst of change notifications triggers a
/// reload: long enough to absorb a multi-step script write, short enough
/// that the display feels live. Tuned against the script suite; override
/// with [`DatabaseWatcher::spawn_with_window`] if needed.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Two-state debounce machine: *idle*, or *pending* with an armed
/// deadline.
///
/// The first notification moves idle to pending; each further notification
/// while pending pushes the deadline out instead of acting. The deadline
/// expiring with no intervening notification fires exactly once and
/// returns to idle.
#[derive(Debug)]
pub struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record a change notification at `now`, arming or resetting the
    /// timer
    pub fn note_event(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// Armed deadline while pending
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true when the timer has expired at `now`; transitions back
    /// to idle
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Debounce loop shared by the real watcher and the timing tests
///
/// `reattach` runs after every notification (watch self-healing);
/// `reload` runs once per quiesced burst. The loop ends when the
/// notification channel closes.
pub(crate) async fn debounce_loop<A, F>(
    mut rx: mpsc::UnboundedReceiver<()>,
    window: Duration,
    mut reattach: A,
    mut reload: F,
) where
    A: FnMut(),
    F: FnMut(),
{
    let mut debounce = Debounce::new(window);

    loop {
        if let Some(deadline) = debounce.deadline() {
            tokio::select! {
                changed = rx.recv() => match changed {
                    Some(()) => {
                        reattach();
                        debounce.note_event(Instant::now());
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if debounce.fire(Instant::now()) {
                        reload();
                    }
                }
            }
        } else {
            match rx.recv().await {
                Some(()) => {
                    reattach();
                    debounce.note_event(Instant::now());
                }
                None => break,
            }
        }
    }
}

/// Watches a library's backing file and reloads it after each quiesced
/// burst of change notifications
///
/// Reload results are reported through the library's event bus, the same
/// channel as a manual load: `DatabaseLoaded` on success,
/// `DatabaseLoadFailed` when the file is momentarily missing (mid-rename).
/// There is no retry on failure - the next real notification tries again.
pub struct DatabaseWatcher {
    task: tokio::task::JoinHandle<()>,
}

impl DatabaseWatcher {
    /// Start watching with the default quiescence window
    pub fn spawn(library: Library) -> Result<Self> {
        Self::spawn_with_window(library, DEBOUNCE_WINDOW)
    }

    pub fn spawn_with_window(library: Library, window: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                match res {
                    Ok(_) => {
                        let _ = tx.send(());
                    }
                    Err(e) => tracing::debug!("watch error: {e}"),
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| std::io::Error::other(e))?;

        let path = library.path().to_path_buf();
        // Initial attach is best-effort; the per-notification re-attach
        // heals a file that appears later
        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            tracing::warn!(path = %path.display(), "initial watch failed: {e}");
        }

        let task = tokio::spawn(async move {
            let reattach_path = path.clone();
            debounce_loop(
                rx,
                window,
                move || reattach(&mut watcher, &reattach_path),
                move || {
                    // Failure already emitted on the event bus; keep the
                    // last-good record set and wait for the next change
                    let _ = library.reload();
                },
            )
            .await;
        });

        Ok(Self { task })
    }

    /// Stop watching. Pending (un-quiesced) notifications are dropped.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Watch handles are best-effort: a replace-via-rename drops them on some
/// platforms. Re-subscribe after every notification.
fn reattach(watcher: &mut RecommendedWatcher, path: &Path) {
    let _ = watcher.unwatch(path);
    if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
        tracing::debug!(path = %path.display(), "watch re-attach failed: {e}");
    }
}
