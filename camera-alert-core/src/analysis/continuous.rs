use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::config::ContinuousConfig;

/// Work performed on each accepted tick (capture + analyze).
pub type TickJob = Arc<dyn Fn() + Send + Sync + 'static>;

/// Reports whether an analysis is already pending elsewhere.
pub type BusyProbe = Arc<dyn Fn() -> bool + Send + Sync + 'static>;

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Fixed-interval analysis loop.
///
/// Each tick hands the job to a worker thread unless the previous job is
/// still running or the probe reports a pending request, in which case the
/// tick is dropped and counted.
pub struct ContinuousAnalyzer {
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ContinuousAnalyzer {
    pub fn start(config: &ContinuousConfig, busy: BusyProbe, job: TickJob) -> Result<Self, String> {
        config.validate()?;

        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let worker_active = Arc::new(AtomicBool::new(false));

        let period = config.period;
        let run_for = config.run_for;
        let r = Arc::clone(&running);
        let t = Arc::clone(&ticks);
        let d = Arc::clone(&dropped);

        let handle = thread::Builder::new()
            .name("continuous-analysis".into())
            .spawn(move || {
                let started = Instant::now();
                let mut next_tick = started;
                log::info!("Continuous analysis started (every {} ms)", period.as_millis());

                while r.load(Ordering::SeqCst) {
                    if run_for.is_some_and(|limit| started.elapsed() >= limit) {
                        log::info!("Continuous analysis run finished");
                        break;
                    }

                    let tick = t.fetch_add(1, Ordering::SeqCst) + 1;
                    if worker_active.load(Ordering::SeqCst) || busy() {
                        let total = d.fetch_add(1, Ordering::SeqCst) + 1;
                        log::debug!("Tick {tick} dropped, analysis in flight ({total} dropped)");
                    } else {
                        worker_active.store(true, Ordering::SeqCst);
                        let active = Arc::clone(&worker_active);
                        let job = Arc::clone(&job);
                        let spawned = thread::Builder::new()
                            .name("analysis-worker".into())
                            .spawn(move || {
                                job();
                                active.store(false, Ordering::SeqCst);
                            });
                        if let Err(e) = spawned {
                            log::error!("Failed to spawn analysis worker: {e}");
                            worker_active.store(false, Ordering::SeqCst);
                        }
                    }

                    next_tick += period;
                    while r.load(Ordering::SeqCst) {
                        let now = Instant::now();
                        if now >= next_tick {
                            break;
                        }
                        thread::sleep((next_tick - now).min(SLEEP_SLICE));
                    }
                }

                r.store(false, Ordering::SeqCst);
                log::debug!("Continuous analysis thread exiting");
            })
            .map_err(|e| format!("failed to spawn continuous analysis thread: {e}"))?;

        Ok(Self {
            running,
            ticks,
            dropped,
            handle: Some(handle),
        })
    }

    /// False once stopped or once `run_for` has elapsed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Ticks skipped because a request was still pending.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Stop ticking. A job already handed to a worker runs to completion.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Continuous analysis thread panicked");
            }
            log::info!(
                "Continuous analysis stopped after {} tick(s), {} dropped",
                self.ticks(),
                self.dropped_ticks()
            );
        }
    }
}

impl Drop for ContinuousAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}
