//! The prioritized scheduler (C7, spec.md §4.7): four priority queues, a
//! dedup set so a `chal_id` already queued or running is never duplicated,
//! and an admission loop that caps total concurrency while reserving at
//! least one slot away from the rejudge queues.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use crate::judge;
use crate::sandbox::SandboxClient;
use crate::submission::{OutboundResult, Priority, Submission};

struct State {
    queues: [VecDeque<Submission>; Priority::COUNT],
    queued: HashSet<u64>,
    in_flight: HashSet<u64>,
}

impl State {
    fn total_in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Shared scheduler state plus the handle used to publish finished results
/// (spec.md §4.8's outbound channel).
pub struct Dispatcher {
    state: Mutex<State>,
    notify: Notify,
    sandbox: Arc<dyn SandboxClient>,
    max_concurrent: usize,
    result_tx: broadcast::Sender<OutboundResult>,
    shutdown: CancellationToken,
}

/// Broadcast capacity: a lagging subscriber drops the oldest backlog entry
/// rather than blocking the scheduler.
const RESULT_CHANNEL_CAPACITY: usize = 256;

impl Dispatcher {
    pub fn new(sandbox: Arc<dyn SandboxClient>, max_concurrent: usize) -> Arc<Self> {
        let (result_tx, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: Mutex::new(State {
                queues: Default::default(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
            }),
            notify: Notify::new(),
            sandbox,
            max_concurrent: max_concurrent.max(1),
            result_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribes to finished submission results, one stream per connected
    /// `/judge` client (spec.md §4.8).
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundResult> {
        self.result_tx.subscribe()
    }

    /// Stops the admission loop after its current batch; in-flight judge
    /// tasks are allowed to finish (spec.md §4.7, following the teacher's
    /// `CancellationToken`-based worker shutdown).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Enqueues a submission (spec.md §4.7). A `chal_id` already queued or
    /// currently running is dropped silently (dedup); re-submission is not
    /// an error condition.
    pub fn emit(&self, submission: Submission) {
        let mut state = self.state.lock();
        if state.queued.contains(&submission.chal_id) || state.in_flight.contains(&submission.chal_id) {
            return;
        }
        let idx = submission.pri.index();
        state.queued.insert(submission.chal_id);
        state.queues[idx].push_back(submission);
        drop(state);
        self.notify.notify_one();
    }

    /// Tries to cancel a still-queued submission. Returns `false` if it is
    /// already running or unknown (spec.md §4.7's cancel path has no effect
    /// on in-flight work).
    pub fn cancel(&self, chal_id: u64) -> bool {
        let mut state = self.state.lock();
        if !state.queued.remove(&chal_id) {
            return false;
        }
        for queue in &mut state.queues {
            queue.retain(|s| s.chal_id != chal_id);
        }
        true
    }

    fn try_admit(&self) -> Option<Submission> {
        let mut state = self.state.lock();
        if state.total_in_flight() >= self.max_concurrent {
            return None;
        }
        for idx in 0..Priority::COUNT {
            let pri = Priority::from_u8(idx as u8).expect("idx is within Priority::COUNT");
            if state.queues[idx].is_empty() {
                continue;
            }
            if pri.reserves_a_slot() && state.total_in_flight() >= self.max_concurrent.saturating_sub(1) {
                continue;
            }
            let submission = state.queues[idx].pop_front().expect("just checked non-empty");
            state.queued.remove(&submission.chal_id);
            state.in_flight.insert(submission.chal_id);
            return Some(submission);
        }
        None
    }

    /// Drains admissible work and spawns one blocking judge task per
    /// submission, looping until the process shuts down. Intended to be
    /// spawned once as its own tokio task.
    pub async fn run(self: Arc<Self>) {
        while !self.shutdown.is_cancelled() {
            let mut admitted_any = false;
            while let Some(submission) = self.try_admit() {
                admitted_any = true;
                Self::spawn_job(Arc::clone(&self), submission);
            }
            if !admitted_any {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
        }
        info!("dispatcher shutting down, letting in-flight submissions finish");
    }

    fn spawn_job(dispatcher: Arc<Self>, submission: Submission) {
        tokio::task::spawn_blocking(move || {
            let chal_id = submission.chal_id;
            info!("judging chal {chal_id} (priority {:?})", submission.pri);
            let results = judge::run(dispatcher.sandbox.as_ref(), &submission);
            let outbound = OutboundResult::new(chal_id, &results);

            let mut state = dispatcher.state.lock();
            state.in_flight.remove(&chal_id);
            drop(state);
            dispatcher.notify.notify_one();

            // No subscribers is a normal state (no client currently
            // connected), not a failure.
            let _ = dispatcher.result_tx.send(outbound);
        });
    }
}
