//! Scheduler that keeps every stored quote reconciled.
//!
//! The controller owns the work queue. Keys enter it from the initial list,
//! from watch notifications and from requeue timers. At most one
//! reconciliation per key runs at a time; a trigger that arrives while its key
//! is in flight is remembered and replayed once the running one finishes.
//! Parallelism across keys is bounded by a semaphore.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::backoff::Backoff;
use crate::context::CancelHandle;
use crate::reconciler::{Outcome, ReconcileError, Reconciled, Reconciler, RetryDecision};
use crate::store::{ObjectStore, StoreError};
use crate::ObjectKey;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("initial object list failed: {0}")]
    InitialList(#[source] StoreError),
}

type Completion = (ObjectKey, Result<Reconciled, ReconcileError>);

/// Runs a [`Reconciler`] over every object in its store.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    workers: usize,
    backoff: Backoff,
}

impl Controller {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            workers: DEFAULT_WORKERS,
            backoff: Backoff::default(),
        }
    }

    /// Maximum concurrent reconciliations across keys. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Per-key backoff applied when a failure names no delay of its own.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until `shutdown` is cancelled, then drains in-flight work.
    pub async fn run(self, shutdown: CancelHandle) -> Result<(), ControllerError> {
        let store = Arc::clone(self.reconciler.store());
        let mut watch = store.subscribe();
        let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();
        let mut state = SchedulerState::new(self.backoff, timer_tx);

        let objects = store.list().await.map_err(ControllerError::InitialList)?;
        tracing::info!(objects = objects.len(), workers = self.workers, "controller started");
        for object in objects {
            state.enqueue(object.key());
        }

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<Completion> = JoinSet::new();
        let mut task_keys = HashMap::new();
        let mut watching = true;

        loop {
            while let Some(key) = state.next_ready() {
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    state.requeue_front(key);
                    break;
                };

                let reconciler = Arc::clone(&self.reconciler);
                let context = shutdown.context_for(&key);
                let task_key = key.clone();
                let handle = tasks.spawn(async move {
                    let _permit = permit;
                    let result = reconciler.reconcile(&task_key, &context).await;
                    (task_key, result)
                });
                task_keys.insert(handle.id(), key);
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(joined) = tasks.join_next() => match joined {
                    Ok((key, result)) => {
                        task_keys.retain(|_, running| running != &key);
                        state.complete(&self.reconciler, key, result);
                    }
                    Err(join_error) => {
                        if let Some(key) = task_keys.remove(&join_error.id()) {
                            tracing::error!(object = %key, error = %join_error, "reconcile task aborted");
                            state.task_failed(key);
                        }
                    }
                },
                Some((key, timer_id)) = timer_rx.recv() => state.fire_timer(key, timer_id),
                event = watch.recv(), if watching => match event {
                    Ok(event) => state.enqueue(event.key().clone()),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "watch lagged; relisting");
                        relist(store.as_ref(), &mut state).await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("watch closed; continuing with timers only");
                        watching = false;
                    }
                },
            }
        }

        tracing::info!(in_flight = tasks.len(), "controller stopping");
        while let Some(joined) = tasks.join_next().await {
            if let Ok((key, Err(error))) = joined {
                tracing::debug!(object = %key, error = %error, "reconcile ended during shutdown");
            }
        }
        state.stop_timers();
        tracing::info!("controller stopped");
        Ok(())
    }
}

async fn relist(store: &dyn ObjectStore, state: &mut SchedulerState) {
    match store.list().await {
        Ok(objects) => {
            for object in objects {
                state.enqueue(object.key());
            }
        }
        Err(error) => tracing::warn!(error = %error, "relist failed"),
    }
}

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

struct SchedulerState {
    ready: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    rerun: HashSet<ObjectKey>,
    timers: HashMap<ObjectKey, Timer>,
    next_timer_id: u64,
    failures: HashMap<ObjectKey, u32>,
    backoff: Backoff,
    timer_tx: mpsc::UnboundedSender<(ObjectKey, u64)>,
}

impl SchedulerState {
    fn new(backoff: Backoff, timer_tx: mpsc::UnboundedSender<(ObjectKey, u64)>) -> Self {
        Self {
            ready: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
            rerun: HashSet::new(),
            timers: HashMap::new(),
            next_timer_id: 0,
            failures: HashMap::new(),
            backoff,
            timer_tx,
        }
    }

    fn enqueue(&mut self, key: ObjectKey) {
        if self.in_flight.contains(&key) {
            self.rerun.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.ready.push_back(key);
        }
    }

    fn next_ready(&mut self) -> Option<ObjectKey> {
        let key = self.ready.pop_front()?;
        self.queued.remove(&key);
        self.in_flight.insert(key.clone());
        Some(key)
    }

    fn requeue_front(&mut self, key: ObjectKey) {
        self.in_flight.remove(&key);
        self.queued.insert(key.clone());
        self.ready.push_front(key);
    }

    fn complete(
        &mut self,
        reconciler: &Reconciler,
        key: ObjectKey,
        result: Result<Reconciled, ReconcileError>,
    ) {
        self.in_flight.remove(&key);

        match result {
            Ok(reconciled) => {
                self.failures.remove(&key);
                if reconciled.outcome == Outcome::Deleted {
                    self.cancel_timer(&key);
                }
                if let Some(after) = reconciled.action.requeue_after() {
                    self.schedule(key.clone(), after);
                }
            }
            Err(error) => match reconciler.error_policy(&error) {
                RetryDecision::After(after) => self.schedule(key.clone(), after),
                RetryDecision::Immediate => self.schedule(key.clone(), Duration::ZERO),
                RetryDecision::Backoff => self.fail_with_backoff(key.clone()),
                RetryDecision::Abandon => {}
            },
        }

        if self.rerun.remove(&key) {
            self.enqueue(key);
        }
    }

    /// A task that panicked or was cancelled never reports a result.
    fn task_failed(&mut self, key: ObjectKey) {
        self.fail_with_backoff(key.clone());
        if self.rerun.remove(&key) {
            self.enqueue(key);
        }
    }

    fn fail_with_backoff(&mut self, key: ObjectKey) {
        self.in_flight.remove(&key);
        let failures = self.failures.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay(*failures);
        *failures = failures.saturating_add(1);
        tracing::debug!(object = %key, attempt = *failures, delay_ms = delay.as_millis() as u64, "backing off");
        self.schedule(key, delay);
    }

    /// Replaces any pending timer for `key`.
    fn schedule(&mut self, key: ObjectKey, after: Duration) {
        self.cancel_timer(&key);
        if after.is_zero() {
            self.enqueue(key);
            return;
        }

        self.next_timer_id = self.next_timer_id.wrapping_add(1);
        let id = self.next_timer_id;
        let tx = self.timer_tx.clone();
        let fire_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send((fire_key, id));
        });
        self.timers.insert(key, Timer { id, handle });
    }

    fn fire_timer(&mut self, key: ObjectKey, id: u64) {
        let current = self.timers.get(&key).is_some_and(|timer| timer.id == id);
        if current {
            self.timers.remove(&key);
            self.enqueue(key);
        }
    }

    fn cancel_timer(&mut self, key: &ObjectKey) {
        if let Some(timer) = self.timers.remove(key) {
            timer.handle.abort();
        }
    }

    fn stop_timers(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}
