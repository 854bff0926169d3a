//! Progress reporting from the blocking extractor.
//!
//! The extractor calls back with `(current, total)` on whatever thread it
//! happens to run on. [`ProgressBridge`] republishes those pairs through a
//! `tokio::sync::watch` channel so a renderer can observe them while the
//! orchestrator is parked on the blocking call.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::extractor::CacheExtractor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    /// May change between reports until the run finishes.
    pub total: u64,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

struct Shared {
    tx: watch::Sender<ProgressSnapshot>,
    finished: AtomicBool,
}

/// Owner side of the progress channel.
pub struct ProgressBridge {
    shared: Arc<Shared>,
}

/// Write end handed to the extractor. Cheap to clone and usable from any
/// thread.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<Shared>,
}

impl ProgressBridge {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProgressSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                tx,
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.shared.tx.subscribe()
    }

    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.shared.tx.borrow()
    }

    /// Force `completed == total`, stop accepting reports and close the
    /// channel once every reporter is gone.
    pub fn finish(self) -> ProgressSnapshot {
        // Under the channel lock, so no report can land after the forced value.
        self.shared.tx.send_modify(|s| {
            self.shared.finished.store(true, Ordering::SeqCst);
            s.completed = s.total;
        });
        let last = *self.shared.tx.borrow();
        debug!("progress finished at {}/{}", last.completed, last.total);
        last
    }
}

impl Default for ProgressBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    /// Publish the latest pair. Reports after [`ProgressBridge::finish`] are
    /// dropped.
    pub fn report(&self, current: u32, total: u32) {
        self.shared.tx.send_if_modified(|s| {
            if self.shared.finished.load(Ordering::SeqCst) {
                return false;
            }
            *s = ProgressSnapshot {
                completed: current as u64,
                total: total as u64,
            };
            true
        });
    }
}

/// Run the blocking extraction on the blocking pool and force the final
/// snapshot once it returns.
///
/// The extractor gives no success signal; returning normally is all that can
/// be observed.
pub async fn run_extractor(
    extractor: Arc<dyn CacheExtractor>,
    cache: PathBuf,
    output: PathBuf,
    bridge: ProgressBridge,
) -> Result<ProgressSnapshot> {
    let reporter = bridge.reporter();
    let joined = tokio::task::spawn_blocking(move || {
        extractor.extract(&cache, &output, reporter);
    })
    .await;

    let last = bridge.finish();
    match joined {
        Ok(()) => Ok(last),
        Err(e) => Err(Error::ExtractorAborted(e.to_string())),
    }
}

const BAR_TEMPLATE: &str = "Extracting: {percent_precise}% [{pos}/{len}] {wide_bar}";

/// Terminal progress bar fed by a watch receiver.
pub struct ProgressRenderer {
    handle: JoinHandle<ProgressSnapshot>,
}

impl ProgressRenderer {
    pub fn spawn(mut rx: watch::Receiver<ProgressSnapshot>, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(style);
        }

        let handle = tokio::spawn(async move {
            let mut drawn = false;
            while rx.changed().await.is_ok() {
                let snapshot = *rx.borrow_and_update();
                bar.set_length(snapshot.total);
                bar.set_position(snapshot.completed);
                drawn = true;
            }
            let last = *rx.borrow();
            if drawn {
                bar.set_length(last.total);
                bar.set_position(last.completed);
                bar.finish();
            } else {
                // The run ended before the extractor started.
                bar.finish_and_clear();
            }
            last
        });

        Self { handle }
    }

    /// Wait for the channel to close and return the last snapshot drawn.
    pub async fn join(self) -> ProgressSnapshot {
        self.handle.await.unwrap_or_default()
    }
}
