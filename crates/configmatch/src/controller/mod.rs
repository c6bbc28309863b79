//! The ConfigMatch controller.
//!
//! Store watch events go through the [`EventRouter`], which applies the
//! change predicates and resolves affected ConfigMatch objects through the
//! store's match-group index. The resulting requests are
//! coalesced in a [`WorkQueue`] and handed to `worker_count` workers that
//! run the [`Reconciler`].

pub mod error;
pub mod pattern;
pub mod predicate;
pub mod queue;
pub mod reconciler;
pub mod router;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::store::{ResourceStore, StoreError, WatchEvent};

pub use error::{OwnerReferenceError, ReconcileError};
pub use pattern::{compile, CompileError, CompiledPattern};
pub use queue::{RequeuePolicy, WorkQueue};
pub use reconciler::{
    select_newest, set_owner_reference, sync_target, OperationResult, ReconcileOutcome,
    Reconciler, RetryPolicy,
};
pub use router::{EventRouter, ReconcileRequest};

pub struct Controller {
    store: Arc<dyn ResourceStore>,
    router: Arc<EventRouter>,
    queue: Arc<WorkQueue<ReconcileRequest>>,
    reconciler: Arc<Reconciler>,
    worker_count: usize,
    requeue: RequeuePolicy,
    shutdown: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

impl Controller {
    pub fn new(store: Arc<dyn ResourceStore>, config: &ControllerConfig) -> Self {
        let reconciler =
            Reconciler::new(Arc::clone(&store)).with_retry_policy(config.retry_policy());
        let router = EventRouter::new(Arc::clone(&store));
        Self {
            store,
            router: Arc::new(router),
            queue: Arc::new(WorkQueue::new()),
            reconciler: Arc::new(reconciler),
            worker_count: config.worker_count.max(1),
            requeue: config.requeue_policy(),
            shutdown: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ReconcileRequest>> {
        &self.queue
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Drops the router's cached patterns and enqueues every labeled
    /// ConfigMatch from a full listing. Returns the number of requests queued.
    pub async fn resync(&self) -> Result<usize, StoreError> {
        let specs = self.store.list_matches().await?;
        self.router.clear();

        let mut queued = 0;
        for spec in &specs {
            for request in self.router.on_match_changed(spec) {
                self.queue.add(request);
                queued += 1;
            }
        }
        info!(
            backend = self.store.backend_name(),
            matches = specs.len(),
            queued,
            "Resynchronized ConfigMatch objects"
        );
        Ok(queued)
    }

    /// Routes one watch event into the queue.
    ///
    /// A failed index lookup only loses this trigger; it is logged and the
    /// next event or resync catches up.
    pub async fn handle_event(&self, event: &WatchEvent) -> usize {
        let requests = match self.router.on_event(event).await {
            Ok(requests) => requests,
            Err(e) => {
                warn!("Failed to route watch event: {}", e);
                return 0;
            }
        };
        let count = requests.len();
        for request in requests {
            debug!(request = %request, "Queueing reconcile request");
            self.queue.add(request);
        }
        count
    }

    /// Runs the controller until [`Controller::shutdown`] is called.
    ///
    /// The watch subscription is taken before the initial listing so no
    /// change made in between is missed.
    pub async fn run(&self) -> Result<(), StoreError> {
        let events = self.store.watch();
        self.resync().await?;

        let workers: Vec<_> = (0..self.worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.reconciler),
                    self.requeue,
                ))
            })
            .collect();
        info!("Started {} workers", self.worker_count);

        self.watch_loop(events).await;

        self.queue.shutdown();
        for (i, result) in futures_util::future::join_all(workers)
            .await
            .into_iter()
            .enumerate()
        {
            if let Err(e) = result {
                error!("Worker {} panicked: {}", i, e);
            }
        }
        info!("All workers have stopped");
        Ok(())
    }

    async fn watch_loop(&self, mut events: broadcast::Receiver<WatchEvent>) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                _ = self.stop.notified() => {}
                event = events.recv() => match event {
                    Ok(event) => {
                        self.handle_event(&event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Watch stream lagged, resynchronizing");
                        if let Err(e) = self.resync().await {
                            error!("Resync after lag failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("Watch stream closed");
                        break;
                    }
                },
            }
        }
    }

    /// Signals the controller to stop. Workers finish the keys already
    /// queued and then exit.
    pub fn shutdown(&self) {
        info!("Shutting down controller...");
        self.shutdown.store(true, Ordering::Release);
        self.stop.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<WorkQueue<ReconcileRequest>>,
    reconciler: Arc<Reconciler>,
    requeue: RequeuePolicy,
) {
    debug!("Worker {} started", worker_id);

    while let Some(request) = queue.get().await {
        match reconciler.reconcile(&request.key).await {
            Ok(outcome) => {
                queue.forget(&request);
                debug!(worker_id, request = %request, %outcome, "Reconciled");
            }
            Err(e) if e.is_retryable() && !queue.is_shutting_down() => {
                let delay = queue.add_rate_limited(request.clone(), &requeue);
                warn!(
                    worker_id,
                    request = %request,
                    ?delay,
                    "Reconcile failed, requeueing: {}",
                    e
                );
            }
            Err(e) => {
                queue.forget(&request);
                error!(worker_id, request = %request, "Reconcile failed: {}", e);
            }
        }
        queue.done(&request);
    }

    debug!("Worker {} stopped", worker_id);
}
