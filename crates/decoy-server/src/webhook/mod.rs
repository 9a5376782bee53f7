//! Webhook fan-out.
//!
//! Matched endpoints hand their webhook definitions to the
//! [`WebhookDispatcher`], which turns each enabled definition into a job on a
//! bounded queue. A fixed pool of worker tasks drains the queue: each job
//! renders its URL, body and headers against the triggering request and makes
//! a single outbound call.
//!
//! A job with a delay waits in its own timer task and joins the queue only
//! once the delay has passed, so a long delay never holds a worker. At most
//! `queue_capacity` jobs may be waiting on timers at once.
//!
//! Enqueueing never blocks. When the queue (or the timer budget) is full the
//! new job is dropped and counted. Jobs live only in memory and are lost on
//! restart.

mod history;

pub use history::{DeliveryHistory, DeliveryOutcome, DeliveryRecord};

use crate::config::WebhookConfig;
use crate::metrics;
use crate::model::WebhookDefinition;
use crate::request::RequestContext;
use crate::template::{RenderContext, TemplateRenderer};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// One pending outbound call.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub id: String,
    pub project_id: String,
    pub endpoint_id: String,
    pub definition: WebhookDefinition,
    pub request: Arc<RequestContext>,
}

impl WebhookJob {
    pub fn new(
        project_id: &str,
        endpoint_id: &str,
        definition: WebhookDefinition,
        request: Arc<RequestContext>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
            definition,
            request,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.definition.delay_ms)
    }
}

/// State shared by the dispatcher handle and its workers.
struct Shared {
    client: reqwest::Client,
    renderer: Arc<TemplateRenderer>,
    history: DeliveryHistory,
    dropped: AtomicU64,
    /// Jobs currently waiting on a timer
    scheduled: AtomicUsize,
}

/// Bounded webhook queue with a fixed worker pool.
pub struct WebhookDispatcher {
    sender: RwLock<Option<mpsc::Sender<WebhookJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    capacity: usize,
    timers: TaskTracker,
    /// Cut pending delays short on shutdown
    flush: CancellationToken,
    shared: Arc<Shared>,
}

impl WebhookDispatcher {
    /// Start the worker pool. Must be called inside a tokio runtime.
    pub fn start(
        config: &WebhookConfig,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let worker_count = config.effective_workers();
        info!(
            "Starting webhook dispatcher with {} workers, queue capacity {}",
            worker_count, config.queue_capacity
        );

        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared {
            client,
            renderer,
            history: DeliveryHistory::new(config.history),
            dropped: AtomicU64::new(0),
            scheduled: AtomicUsize::new(0),
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let shared = Arc::clone(&shared);
                tokio::spawn(run_worker(worker_id, receiver, shared))
            })
            .collect();

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            worker_count,
            capacity,
            timers: TaskTracker::new(),
            flush: CancellationToken::new(),
            shared,
        })
    }

    /// Queue every enabled webhook; returns how many were accepted.
    pub fn enqueue(
        &self,
        project_id: &str,
        endpoint_id: &str,
        definitions: &[WebhookDefinition],
        request: &Arc<RequestContext>,
    ) -> usize {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            debug!("Webhook dispatcher is shut down; ignoring webhooks");
            return 0;
        };

        let mut accepted = 0;
        for definition in definitions.iter().filter(|d| d.enabled) {
            let job = WebhookJob::new(project_id, endpoint_id, definition.clone(), Arc::clone(request));
            let result = if job.delay().is_zero() {
                queue_job(sender, job)
            } else {
                self.schedule(sender, job)
            };
            match result {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(job)) => {
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::record_webhook_dropped();
                    warn!(
                        project = %job.project_id,
                        endpoint = %job.endpoint_id,
                        webhook = %job.definition.name,
                        "Webhook queue is full, job dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Webhook queue closed; job ignored");
                }
            }
        }
        accepted
    }

    /// Park a delayed job in a timer task that queues it once the delay ends.
    fn schedule(
        &self,
        sender: &mpsc::Sender<WebhookJob>,
        job: WebhookJob,
    ) -> Result<(), TrySendError<WebhookJob>> {
        let reserved = self
            .shared
            .scheduled
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            return Err(TrySendError::Full(job));
        }

        let sender = sender.clone();
        let flush = self.flush.clone();
        let shared = Arc::clone(&self.shared);
        self.timers.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(job.delay()) => {}
                _ = flush.cancelled() => {
                    debug!(webhook = %job.definition.name, "Delay cut short by shutdown");
                }
            }
            shared.scheduled.fetch_sub(1, Ordering::AcqRel);

            metrics::WEBHOOK_QUEUE_DEPTH.inc();
            if sender.send(job).await.is_err() {
                metrics::WEBHOOK_QUEUE_DEPTH.dec();
                debug!("Webhook queue closed; delayed job ignored");
            }
        });
        Ok(())
    }

    pub fn history(&self) -> &DeliveryHistory {
        &self.shared.history
    }

    /// Jobs dropped on a full queue since start.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs waiting on their delay.
    pub fn scheduled(&self) -> usize {
        self.shared.scheduled.load(Ordering::Acquire)
    }

    /// Stop accepting jobs and wait for the workers to drain the queue.
    ///
    /// Jobs still waiting on a delay are queued immediately.
    pub async fn shutdown(&self) {
        // The channel closes once this sender and every timer's clone are gone.
        let sender = self.sender.write().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        self.flush.cancel();
        self.timers.close();
        self.timers.wait().await;

        let workers = std::mem::take(&mut *self.workers.lock());
        info!("Draining webhook queue with {} workers", workers.len());
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                warn!("Webhook worker ended abnormally: {}", e);
            }
        }
        info!("Webhook dispatcher shutdown complete");
    }
}

/// Put a job on the queue without waiting, keeping the depth gauge in step.
fn queue_job(
    sender: &mpsc::Sender<WebhookJob>,
    job: WebhookJob,
) -> Result<(), TrySendError<WebhookJob>> {
    // Count before sending so a worker's decrement can never run first.
    metrics::WEBHOOK_QUEUE_DEPTH.inc();
    sender.try_send(job).inspect_err(|_| metrics::WEBHOOK_QUEUE_DEPTH.dec())
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<WebhookJob>>>,
    shared: Arc<Shared>,
) {
    debug!("Webhook worker {} started", worker_id);
    loop {
        // Hold the receiver lock only while waiting for the next job.
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        metrics::WEBHOOK_QUEUE_DEPTH.dec();

        let record = deliver(&shared, &job).await;
        metrics::record_webhook_delivery(record.outcome.label());
        shared.history.push(record);
    }
    debug!("Webhook worker {} shutting down", worker_id);
}

/// Render and send one job. Never fails; the outcome is in the record.
async fn deliver(shared: &Shared, job: &WebhookJob) -> DeliveryRecord {
    let ctx = RenderContext::for_request(&job.request);
    let renderer = &shared.renderer;
    let url = renderer.render(&job.definition.url, &ctx);
    let method_name = job.definition.method.trim().to_uppercase();
    let attempted_at = Utc::now();
    let start = Instant::now();

    let outcome = match reqwest::Method::from_bytes(method_name.as_bytes()) {
        Err(_) => DeliveryOutcome::Failed {
            error: format!("invalid method '{}'", job.definition.method),
        },
        Ok(method) => {
            let mut request = shared.client.request(method, &url);
            for (name, value) in renderer.render_map(&job.definition.headers, &ctx) {
                request = request.header(name, value);
            }
            if let Some(body) = &job.definition.body {
                request = request.body(renderer.render(body, &ctx));
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered {
                    status: response.status().as_u16(),
                },
                Ok(response) => DeliveryOutcome::Rejected {
                    status: response.status().as_u16(),
                },
                Err(e) => DeliveryOutcome::Failed {
                    error: e.to_string(),
                },
            }
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &outcome {
        DeliveryOutcome::Delivered { status } => debug!(
            webhook = %job.definition.name,
            url = %url,
            status = status,
            duration_ms = duration_ms,
            "Webhook delivered"
        ),
        DeliveryOutcome::Rejected { status } => warn!(
            webhook = %job.definition.name,
            url = %url,
            status = status,
            "Webhook target rejected delivery"
        ),
        DeliveryOutcome::Failed { error } => warn!(
            webhook = %job.definition.name,
            url = %url,
            error = %error,
            "Webhook delivery failed"
        ),
    }

    DeliveryRecord {
        job_id: job.id.clone(),
        project_id: job.project_id.clone(),
        endpoint_id: job.endpoint_id.clone(),
        webhook: job.definition.name.clone(),
        method: method_name,
        url,
        outcome,
        duration_ms,
        attempted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    fn config(workers: usize, queue_capacity: usize) -> WebhookConfig {
        WebhookConfig {
            workers,
            queue_capacity,
            timeout_ms: 2_000,
            history: 10,
        }
    }

    fn webhook(name: &str, url: &str) -> WebhookDefinition {
        serde_json::from_value(serde_json::json!({ "name": name, "url": url })).unwrap()
    }

    fn request() -> Arc<RequestContext> {
        Arc::new(RequestContext::new(
            "POST",
            "/orders",
            Some("id=7"),
            &HeaderMap::new(),
            None,
        ))
    }

    #[test]
    fn test_job_delay() {
        let mut def = webhook("a", "http://localhost/");
        def.delay_ms = 250;
        let job = WebhookJob::new("p", "e", def, request());
        assert_eq!(job.delay(), Duration::from_millis(250));
        assert!(!job.id.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_new_jobs() {
        let dispatcher =
            WebhookDispatcher::start(&config(1, 1), Arc::new(TemplateRenderer::default()))
                .unwrap();
        // Port 9 (discard) is not listening on test hosts; delivery fails fast.
        let hooks = vec![
            webhook("one", "http://127.0.0.1:9/hook"),
            webhook("two", "http://127.0.0.1:9/hook"),
            webhook("three", "http://127.0.0.1:9/hook"),
        ];
        // Workers have not been polled yet, so only one job fits.
        let accepted = dispatcher.enqueue("p", "e", &hooks, &request());
        assert_eq!(accepted, 1);
        assert_eq!(dispatcher.dropped(), 2);

        dispatcher.shutdown().await;
        let records = dispatcher.history().for_endpoint("p", "e");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].webhook, "one");
        assert!(!records[0].outcome.is_success());
    }

    #[tokio::test]
    async fn test_delayed_job_does_not_hold_the_only_worker() {
        let dispatcher =
            WebhookDispatcher::start(&config(1, 4), Arc::new(TemplateRenderer::default()))
                .unwrap();
        let mut slow = webhook("slow", "http://127.0.0.1:9/slow");
        slow.delay_ms = 1_500;
        let fast = webhook("fast", "http://127.0.0.1:9/fast");

        assert_eq!(dispatcher.enqueue("p", "e1", &[slow], &request()), 1);
        assert_eq!(dispatcher.enqueue("p", "e2", &[fast], &request()), 1);
        assert_eq!(dispatcher.scheduled(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(dispatcher.history().for_endpoint("p", "e2").len(), 1);
        assert!(dispatcher.history().for_endpoint("p", "e1").is_empty());

        // Shutdown releases the pending delay instead of dropping the job.
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.scheduled(), 0);
        let slow_records = dispatcher.history().for_endpoint("p", "e1");
        assert_eq!(slow_records.len(), 1);
        assert_eq!(slow_records[0].webhook, "slow");
    }

    #[tokio::test]
    async fn test_timer_budget_drops_excess_delayed_jobs() {
        let dispatcher =
            WebhookDispatcher::start(&config(1, 2), Arc::new(TemplateRenderer::default()))
                .unwrap();
        let hooks: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let mut hook = webhook(name, "http://127.0.0.1:9/hook");
                hook.delay_ms = 60_000;
                hook
            })
            .collect();

        assert_eq!(dispatcher.enqueue("p", "e", &hooks, &request()), 2);
        assert_eq!(dispatcher.dropped(), 1);
        assert_eq!(dispatcher.scheduled(), 2);

        dispatcher.shutdown().await;
        assert_eq!(dispatcher.history().for_endpoint("p", "e").len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_webhooks_are_skipped() {
        let dispatcher =
            WebhookDispatcher::start(&config(1, 4), Arc::new(TemplateRenderer::default()))
                .unwrap();
        let mut hook = webhook("off", "http://127.0.0.1:9/hook");
        hook.enabled = false;
        assert_eq!(dispatcher.enqueue("p", "e", &[hook], &request()), 0);
        dispatcher.shutdown().await;
        assert!(dispatcher.history().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_method_is_recorded() {
        let dispatcher =
            WebhookDispatcher::start(&config(2, 4), Arc::new(TemplateRenderer::default()))
                .unwrap();
        let mut hook = webhook("bad", "http://127.0.0.1:9/{{request.query.id}}");
        hook.method = "NOT A METHOD".to_string();
        assert_eq!(dispatcher.enqueue("p", "e", &[hook], &request()), 1);
        dispatcher.shutdown().await;

        let records = dispatcher.history().all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://127.0.0.1:9/7");
        assert!(matches!(
            records[0].outcome,
            DeliveryOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_ignored() {
        let dispatcher =
            WebhookDispatcher::start(&config(1, 4), Arc::new(TemplateRenderer::default()))
                .unwrap();
        dispatcher.shutdown().await;
        let hook = webhook("late", "http://127.0.0.1:9/hook");
        assert_eq!(dispatcher.enqueue("p", "e", &[hook], &request()), 0);
        assert_eq!(dispatcher.dropped(), 0);
    }
}
