//! Fake runners standing in for spotdl

use async_trait::async_trait;
use sopti::types::{FailureReason, Job, Outcome};
use sopti::JobRunner;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A non-zero tool exit
pub fn tool_failure() -> Outcome {
    Outcome::Failed {
        reason: FailureReason::ToolExit {
            code: Some(1),
            detail: Some("LookupError: no results".to_string()),
        },
    }
}

/// Runner that records how many jobs run at once
///
/// Each call sleeps for `delay` and then succeeds, unless the key is listed in
/// `fail_first` (first call fails) or `fail_always`.
pub struct TrackingRunner {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    invocations: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
    fail_first: HashSet<String>,
    fail_always: HashSet<String>,
}

impl TrackingRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            invocations: AtomicUsize::new(0),
            calls: Mutex::new(HashMap::new()),
            fail_first: HashSet::new(),
            fail_always: HashSet::new(),
        }
    }

    pub fn failing_first(mut self, keys: &[&str]) -> Self {
        self.fail_first = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn failing_always(mut self, keys: &[&str]) -> Self {
        self.fail_always = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobRunner for TrackingRunner {
    async fn run(&self, job: &Job, cancel: &CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::cancelled();
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut calls = self.calls.lock().expect("calls lock poisoned");
            let count = calls.entry(job.key.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let finished = tokio::select! {
            () = tokio::time::sleep(self.delay) => true,
            () = cancel.cancelled() => false,
        };
        self.active.fetch_sub(1, Ordering::SeqCst);

        if !finished {
            return Outcome::cancelled();
        }
        let key = job.key.as_str();
        if self.fail_always.contains(key) || (call == 1 && self.fail_first.contains(key)) {
            return tool_failure();
        }
        Outcome::Success
    }

    fn name(&self) -> &'static str {
        "tracking"
    }
}

/// Runner whose jobs take `delay` and ignore cancellation entirely
pub struct StubbornRunner {
    pub delay: Duration,
    pub started: AtomicUsize,
}

impl StubbornRunner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobRunner for StubbornRunner {
    async fn run(&self, _job: &Job, _cancel: &CancellationToken) -> Outcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Outcome::Success
    }

    fn name(&self) -> &'static str {
        "stubborn"
    }
}
