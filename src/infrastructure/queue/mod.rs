use crate::domain::audio::GenerationKey;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Mutex;
use tokio::sync::Notify;

/// One queued generation job. Lower `priority` drains first; jobs with equal
/// priority drain in enqueue order.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub key: GenerationKey,
    pub priority: i32,
    seq: u64,
}

impl QueuedJob {
    pub fn job_id(&self) -> String {
        self.key.job_id()
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the numerically
        // lowest priority on top.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    // Job ids of queued and in-flight jobs; makes enqueue idempotent.
    pending: HashSet<String>,
    next_seq: u64,
}

/// In-process priority broker behind the same contract as an external job
/// queue: priority ordering, idempotent job ids, and graceful absence (a
/// disabled queue accepts nothing).
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    enabled: bool,
}

impl JobQueue {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            tracing::warn!("Prefetch queue disabled; serving on-demand only");
        }
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enqueue one job. Returns false when the queue is disabled or the job
    /// id is already queued or in flight.
    pub fn enqueue(&self, key: GenerationKey, priority: i32) -> bool {
        if !self.enabled {
            return false;
        }

        let accepted = {
            let mut state = self.state.lock().expect("queue state poisoned");
            if !state.pending.insert(key.job_id()) {
                false
            } else {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.heap.push(QueuedJob { key, priority, seq });
                true
            }
        };

        if accepted {
            self.notify.notify_one();
        }
        accepted
    }

    /// Pop the most urgent job, or `None` when the queue is empty. The job's
    /// id stays reserved until `complete` is called.
    pub fn pop(&self) -> Option<QueuedJob> {
        let mut state = self.state.lock().expect("queue state poisoned");
        state.heap.pop()
    }

    /// Wait until a job is available and pop it.
    pub async fn next_job(&self) -> QueuedJob {
        loop {
            if let Some(job) = self.pop() {
                // A Notify holds at most one permit; pass the baton so other
                // workers wake up while the backlog is non-empty.
                if self.depth() > 0 {
                    self.notify.notify_one();
                }
                return job;
            }
            self.notify.notified().await;
        }
    }

    /// Release a job id after the job finished (successfully or not), so the
    /// key can be enqueued again later.
    pub fn complete(&self, job: &QueuedJob) {
        let mut state = self.state.lock().expect("queue state poisoned");
        state.pending.remove(&job.job_id());
    }

    pub fn depth(&self) -> usize {
        let state = self.state.lock().expect("queue state poisoned");
        state.heap.len()
    }
}
