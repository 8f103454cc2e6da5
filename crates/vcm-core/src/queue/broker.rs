//! Broker implementation: per-queue state behind a mutex plus a notifier.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::retry::RetryPolicy;

use super::types::{Claimed, EnqueueOpts, JobCounts, QueueName, ReleaseToken};

#[derive(Debug, Clone)]
struct Unit {
    job_key: i64,
    payload: Value,
    attempts: u32,
    max_attempts: u32,
}

#[derive(Debug)]
struct ActiveUnit {
    unit: Unit,
    deadline: Instant,
}

#[derive(Default)]
struct QueueInner {
    waiting: VecDeque<Unit>,
    delayed: Vec<(Instant, Unit)>,
    active: HashMap<u64, ActiveUnit>,
    paused: bool,
    completed: u64,
    failed: u64,
}

impl QueueInner {
    fn holds_key(&self, job_key: i64) -> bool {
        self.waiting.iter().any(|u| u.job_key == job_key)
            || self.delayed.iter().any(|(_, u)| u.job_key == job_key)
    }

    /// Move due delayed units onto the waiting queue.
    fn promote_due(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, unit) = self.delayed.remove(i);
                self.waiting.push_back(unit);
            } else {
                i += 1;
            }
        }
    }

    /// Redeliver claims whose visibility deadline passed (dead worker).
    fn reap_expired(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .active
            .iter()
            .filter(|(_, a)| a.deadline <= now)
            .map(|(t, _)| *t)
            .collect();
        for token in expired {
            if let Some(active) = self.active.remove(&token) {
                let mut unit = active.unit;
                unit.attempts += 1;
                if unit.attempts >= unit.max_attempts {
                    tracing::warn!(job_key = unit.job_key, "claim expired too often, dropping");
                    self.failed += 1;
                } else {
                    tracing::debug!(job_key = unit.job_key, "claim expired, redelivering");
                    self.waiting.push_back(unit);
                }
            }
        }
    }
}

struct QueueCell {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

/// In-process broker with three named queues, delayed delivery, job-id
/// keyed de-dup/removal, and visibility-timeout redelivery.
pub struct QueueBroker {
    queues: HashMap<QueueName, QueueCell>,
    next_token: AtomicU64,
    visibility_timeout: Duration,
    retry: RetryPolicy,
}

impl QueueBroker {
    pub fn new(visibility_timeout: Duration) -> Self {
        let mut queues = HashMap::new();
        for name in QueueName::ALL {
            queues.insert(
                name,
                QueueCell {
                    inner: Mutex::new(QueueInner::default()),
                    notify: Notify::new(),
                },
            );
        }
        Self {
            queues,
            next_token: AtomicU64::new(1),
            visibility_timeout,
            retry: RetryPolicy::default(),
        }
    }

    fn cell(&self, queue: QueueName) -> &QueueCell {
        // All three queues are created in `new`.
        &self.queues[&queue]
    }

    /// Add a unit keyed by the durable job id. Re-enqueueing a key that is
    /// already waiting or delayed is a no-op (de-dup). The in-process broker
    /// cannot fail here; the Result is the contract an external broker needs.
    pub fn enqueue(
        &self,
        queue: QueueName,
        job_key: i64,
        payload: Value,
        opts: EnqueueOpts,
    ) -> anyhow::Result<()> {
        let cell = self.cell(queue);
        {
            let mut q = cell.inner.lock().unwrap();
            if q.holds_key(job_key) {
                tracing::debug!(queue = queue.as_str(), job_key, "duplicate enqueue ignored");
                return Ok(());
            }
            let unit = Unit {
                job_key,
                payload,
                attempts: 0,
                max_attempts: opts.max_attempts.max(1),
            };
            match opts.delay {
                Some(delay) => q.delayed.push((Instant::now() + delay, unit)),
                None => q.waiting.push_back(unit),
            }
        }
        cell.notify.notify_waiters();
        Ok(())
    }

    /// Claim one unit, waiting up to `timeout` for something to become due.
    /// Returns None on timeout so callers can re-check shutdown conditions.
    pub async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        timeout: Duration,
    ) -> Option<Claimed> {
        let deadline = Instant::now() + timeout;
        let cell = self.cell(queue);
        loop {
            {
                let mut q = cell.inner.lock().unwrap();
                let now = Instant::now();
                q.promote_due(now);
                q.reap_expired(now);
                if !q.paused {
                    if let Some(unit) = q.waiting.pop_front() {
                        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                        let claimed = Claimed {
                            job_key: unit.job_key,
                            payload: unit.payload.clone(),
                            release: ReleaseToken { queue, token },
                        };
                        tracing::debug!(
                            queue = queue.as_str(),
                            job_key = unit.job_key,
                            worker_id,
                            "unit claimed"
                        );
                        q.active.insert(
                            token,
                            ActiveUnit {
                                unit,
                                deadline: now + self.visibility_timeout,
                            },
                        );
                        return Some(claimed);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            // Bounded wait: a notification, the claim deadline, or a short
            // poll tick (covers delayed promotion and missed wakeups).
            let wait = (deadline - now).min(Duration::from_millis(250));
            let _ = tokio::time::timeout(wait, cell.notify.notified()).await;
        }
    }

    /// Release a claim after successful processing.
    pub fn ack(&self, release: ReleaseToken) {
        let cell = self.cell(release.queue);
        let mut q = cell.inner.lock().unwrap();
        if q.active.remove(&release.token).is_some() {
            q.completed += 1;
        }
    }

    /// Release a claim after a failure. With `requeue` the unit is redelivered
    /// after backoff until its attempt budget runs out; otherwise it is
    /// dropped to the failed count.
    pub fn nack(&self, release: ReleaseToken, requeue: bool) {
        let cell = self.cell(release.queue);
        {
            let mut q = cell.inner.lock().unwrap();
            let Some(active) = q.active.remove(&release.token) else {
                return;
            };
            let mut unit = active.unit;
            unit.attempts += 1;
            if !requeue || unit.attempts >= unit.max_attempts {
                q.failed += 1;
            } else {
                let delay = self.retry.backoff(unit.attempts);
                q.delayed.push((Instant::now() + delay, unit));
            }
        }
        cell.notify.notify_waiters();
    }

    /// Evict an unstarted unit (pause/cancel of a pending job). Active claims
    /// are not touched; the worker observes the status change instead.
    pub fn remove(&self, queue: QueueName, job_key: i64) -> bool {
        let cell = self.cell(queue);
        let mut q = cell.inner.lock().unwrap();
        let waiting_before = q.waiting.len();
        q.waiting.retain(|u| u.job_key != job_key);
        let delayed_before = q.delayed.len();
        q.delayed.retain(|(_, u)| u.job_key != job_key);
        waiting_before != q.waiting.len() || delayed_before != q.delayed.len()
    }

    /// Stop handing out units from this queue; waiting units count as paused.
    pub fn pause_queue(&self, queue: QueueName) {
        self.cell(queue).inner.lock().unwrap().paused = true;
    }

    pub fn resume_queue(&self, queue: QueueName) {
        let cell = self.cell(queue);
        cell.inner.lock().unwrap().paused = false;
        cell.notify.notify_waiters();
    }

    /// Counters for observability (`GET /queues`).
    pub fn job_counts(&self, queue: QueueName) -> JobCounts {
        let mut q = self.cell(queue).inner.lock().unwrap();
        let now = Instant::now();
        q.promote_due(now);
        let waiting = q.waiting.len() as u64;
        JobCounts {
            waiting: if q.paused { 0 } else { waiting },
            active: q.active.len() as u64,
            delayed: q.delayed.len() as u64,
            completed: q.completed,
            failed: q.failed,
            paused: if q.paused { waiting } else { 0 },
        }
    }
}
