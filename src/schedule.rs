//! Cooperative fixed-interval scheduler.
//!
//! Jobs run synchronously on the caller's thread. A job that becomes due runs
//! once per tick, in registration order, and is next due one interval after
//! the later of that tick and its completion. A failing job is logged and
//! keeps its schedule.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

type Task<'a> = Box<dyn FnMut() -> Result<()> + 'a>;

struct Job<'a> {
    name: String,
    interval: Duration,
    next_run: Instant,
    task: Task<'a>,
}

/// What happened to one job on a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobOutcome {
    pub name: String,
    pub ok: bool,
}

#[derive(Default)]
pub struct Scheduler<'a> {
    jobs: Vec<Job<'a>>,
}

impl<'a> Scheduler<'a> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Register `task` to run every `interval`, first due one interval from now.
    pub fn every<F>(&mut self, name: &str, interval: Duration, task: F) -> Result<()>
    where
        F: FnMut() -> Result<()> + 'a,
    {
        if interval.is_zero() {
            return Err(anyhow!("job {} needs a non-zero interval", name));
        }
        self.jobs.push(Job {
            name: name.to_string(),
            interval,
            next_run: Instant::now() + interval,
            task: Box::new(task),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every job immediately, regardless of its schedule.
    pub fn run_all(&mut self) -> Vec<JobOutcome> {
        let now = Instant::now();
        self.jobs.iter_mut().map(|job| run_job(job, now)).collect()
    }

    /// Run the jobs due at `now`.
    pub fn run_pending(&mut self, now: Instant) -> Vec<JobOutcome> {
        self.jobs
            .iter_mut()
            .filter(|job| job.next_run <= now)
            .map(|job| run_job(job, now))
            .collect()
    }

    /// Time until the earliest job is due, measured from `now`.
    pub fn idle(&self, now: Instant) -> Option<Duration> {
        self.jobs
            .iter()
            .map(|job| job.next_run.saturating_duration_since(now))
            .min()
    }
}

/// Run `job` on the tick at `now`; it is next due one interval after the
/// later of the tick and its completion.
fn run_job(job: &mut Job<'_>, now: Instant) -> JobOutcome {
    let started = Instant::now();
    let result = (job.task)();
    let finished = Instant::now();
    job.next_run = now.max(finished) + job.interval;

    match &result {
        Ok(()) => log::debug!(
            "job {} finished in {:?}",
            job.name,
            finished.duration_since(started)
        ),
        Err(err) => log::error!("job {} failed: {:#}", job.name, err),
    }
    JobOutcome {
        name: job.name.clone(),
        ok: result.is_ok(),
    }
}
