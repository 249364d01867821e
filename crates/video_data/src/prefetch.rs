//! Single-worker prefetch scheduler.
//!
//! The scheduler runs one job at a time on a background thread:
//!
//! ```text
//!            start()                      wait()
//!   Idle(job) ──────► Running(handle) ──────────► Idle(job)
//!       ▲                                              │
//!       └──────────────── consumer reads job ◄─────────┘
//! ```
//!
//! The job is moved into the worker for the run and handed back only by the
//! join in `wait()`, so the consumer can never observe a partially written
//! job. A panicking worker leaves the scheduler poisoned.

use anyhow::{anyhow, bail, Context, Result};
use std::mem;
use std::thread::{self, JoinHandle};

/// Work performed once per prefetch run.
pub trait PrefetchJob: Send + 'static {
    fn run(&mut self) -> Result<()>;
}

enum State<J> {
    Idle(J),
    Running(JoinHandle<(J, Result<()>)>),
    Poisoned,
}

/// Runs a [`PrefetchJob`] on a background thread, at most once at a time.
pub struct PrefetchScheduler<J: PrefetchJob> {
    state: State<J>,
    name: String,
    runs: usize,
}

impl<J: PrefetchJob> PrefetchScheduler<J> {
    pub fn new(job: J) -> Self {
        Self {
            state: State::Idle(job),
            name: "video-prefetch".to_string(),
            runs: 0,
        }
    }

    /// Sets the worker thread name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// Completed or started runs.
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Spawns the worker for one run of the job.
    ///
    /// Fails if a run is already outstanding; call [`wait`](Self::wait) first.
    pub fn start(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(mut job) => {
                let handle = thread::Builder::new()
                    .name(self.name.clone())
                    .spawn(move || {
                        let result = job.run();
                        (job, result)
                    })
                    .with_context(|| format!("Failed to spawn prefetch thread {}", self.name))?;
                self.state = State::Running(handle);
                self.runs += 1;
                Ok(())
            }
            running @ State::Running(_) => {
                self.state = running;
                bail!("A prefetch run is already outstanding; wait() before start()")
            }
            State::Poisoned => bail!("Prefetch worker panicked earlier; the scheduler is unusable"),
        }
    }

    /// Blocks until the outstanding run finishes. A no-op when idle.
    ///
    /// Returns the error of a failed run. The job is back in place afterwards
    /// either way, unless the worker panicked.
    pub fn wait(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(job) => {
                self.state = State::Idle(job);
                Ok(())
            }
            State::Running(handle) => match handle.join() {
                Ok((job, result)) => {
                    self.state = State::Idle(job);
                    result.context("Prefetch run failed")
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    Err(anyhow!("Prefetch worker panicked: {}", message))
                }
            },
            State::Poisoned => bail!("Prefetch worker panicked earlier; the scheduler is unusable"),
        }
    }

    /// The job, available only while idle.
    pub fn job(&self) -> Result<&J> {
        match &self.state {
            State::Idle(job) => Ok(job),
            State::Running(_) => bail!("Prefetch run in progress; wait() before reading the job"),
            State::Poisoned => bail!("Prefetch worker panicked; the job is lost"),
        }
    }

    pub fn job_mut(&mut self) -> Result<&mut J> {
        match &mut self.state {
            State::Idle(job) => Ok(job),
            State::Running(_) => bail!("Prefetch run in progress; wait() before reading the job"),
            State::Poisoned => bail!("Prefetch worker panicked; the job is lost"),
        }
    }
}

impl<J: PrefetchJob> Drop for PrefetchScheduler<J> {
    fn drop(&mut self) {
        if let State::Running(handle) = mem::replace(&mut self.state, State::Poisoned) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Counter {
        value: usize,
        delay: Duration,
    }

    impl PrefetchJob for Counter {
        fn run(&mut self) -> Result<()> {
            thread::sleep(self.delay);
            self.value += 1;
            Ok(())
        }
    }

    struct Failing;

    impl PrefetchJob for Failing {
        fn run(&mut self) -> Result<()> {
            bail!("cursor out of range")
        }
    }

    struct Panicking;

    impl PrefetchJob for Panicking {
        fn run(&mut self) -> Result<()> {
            panic!("worker exploded")
        }
    }

    fn counter(delay_ms: u64) -> Counter {
        Counter {
            value: 0,
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn test_start_then_wait() -> Result<()> {
        let mut scheduler = PrefetchScheduler::new(counter(10));
        scheduler.start()?;
        assert!(scheduler.is_running());
        assert!(scheduler.job().is_err());
        scheduler.wait()?;
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.job()?.value, 1);

        for _ in 0..3 {
            scheduler.start()?;
            scheduler.wait()?;
        }
        assert_eq!(scheduler.job()?.value, 4);
        assert_eq!(scheduler.runs(), 4);
        Ok(())
    }

    #[test]
    fn test_wait_when_idle_is_noop() -> Result<()> {
        let mut scheduler = PrefetchScheduler::new(counter(0));
        scheduler.wait()?;
        scheduler.wait()?;
        assert_eq!(scheduler.job()?.value, 0);
        Ok(())
    }

    #[test]
    fn test_second_start_is_rejected() -> Result<()> {
        let mut scheduler = PrefetchScheduler::new(counter(50));
        scheduler.start()?;
        let err = scheduler.start().unwrap_err();
        assert!(err.to_string().contains("already outstanding"));
        // The outstanding run is unaffected and only one run happened.
        scheduler.wait()?;
        assert_eq!(scheduler.job()?.value, 1);
        Ok(())
    }

    #[test]
    fn test_run_error_surfaces_on_wait() -> Result<()> {
        let mut scheduler = PrefetchScheduler::new(Failing);
        scheduler.start()?;
        let err = scheduler.wait().unwrap_err();
        assert!(format!("{:#}", err).contains("cursor out of range"));
        // The job comes back and can be retried.
        assert!(scheduler.job().is_ok());
        scheduler.start()?;
        assert!(scheduler.wait().is_err());
        Ok(())
    }

    #[test]
    fn test_panic_poisons_scheduler() {
        let mut scheduler = PrefetchScheduler::new(Panicking);
        scheduler.start().unwrap();
        let err = scheduler.wait().unwrap_err();
        assert!(err.to_string().contains("worker exploded"));
        assert!(scheduler.start().is_err());
        assert!(scheduler.wait().is_err());
        assert!(scheduler.job().is_err());
    }

    #[test]
    fn test_worker_overlaps_with_caller() -> Result<()> {
        struct Gate(mpsc::Receiver<()>);
        impl PrefetchJob for Gate {
            fn run(&mut self) -> Result<()> {
                self.0.recv()?;
                Ok(())
            }
        }

        let (tx, rx) = mpsc::channel();
        let mut scheduler = PrefetchScheduler::new(Gate(rx)).with_name("gate");
        scheduler.start()?;
        // The caller keeps running while the worker blocks.
        assert!(scheduler.is_running());
        tx.send(())?;
        scheduler.wait()?;
        Ok(())
    }

    #[test]
    fn test_drop_joins_outstanding_run() -> Result<()> {
        let mut scheduler = PrefetchScheduler::new(counter(20));
        scheduler.start()?;
        drop(scheduler);
        Ok(())
    }
}
