use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{config::ConsumerConfig, envelope::Delivery, transport::StreamTransport};

/// What a handler decided about one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processed; acknowledge it
    Ack,
    /// Leave it pending in the group
    Skip,
}

/// Application callback invoked for every delivered message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> HandlerOutcome;
}

/// Adapts a synchronous closure into a [`MessageHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Delivery) -> HandlerOutcome + Send + Sync,
{
    async fn handle(&self, delivery: &Delivery) -> HandlerOutcome {
        (self.0)(delivery)
    }
}

/// Lifecycle of a [`ConsumerWorker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub delivered: usize,
    pub acked: usize,
    pub skipped: usize,
}

/// Polls one consumer group on a fixed cadence and feeds a handler.
///
/// # Example
///
/// ```ignore
/// let worker_config = ConsumerConfig::new("orders", "billing", "worker-1");
/// let mut worker = ConsumerWorker::new(transport.clone(), worker_config);
///
/// worker.start(Arc::new(FnHandler(|delivery: &Delivery| {
///     println!("{}: {}", delivery.id, delivery.payload);
///     HandlerOutcome::Ack
/// })));
///
/// // later
/// worker.stop().await;
/// ```
///
/// Shutdown is observed between ticks only: a batch that is being handled
/// finishes, acknowledgments included, before the loop exits.
pub struct ConsumerWorker {
    transport: Arc<StreamTransport>,
    config: ConsumerConfig,
    state: Arc<RwLock<WorkerState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ConsumerWorker {
    pub fn new(transport: Arc<StreamTransport>, config: ConsumerConfig) -> Self {
        Self {
            transport,
            config,
            state: Arc::new(RwLock::new(WorkerState::Idle)),
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Spawn the poll loop. Does nothing if the worker is already running.
    pub fn start(&mut self, handler: Arc<dyn MessageHandler>) {
        if self.state() == WorkerState::Running {
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        *self.state.write() = WorkerState::Running;

        info!(
            log_key = %self.config.log_key,
            group = %self.config.group,
            consumer = %self.config.consumer,
            interval_ms = self.config.poll_interval().as_millis() as u64,
            "Starting consumer worker"
        );

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let state = Arc::clone(&self.state);

        self.handle = Some(tokio::spawn(async move {
            Self::run(transport, config, handler, shutdown_rx).await;
            *state.write() = WorkerState::Stopped;
        }));
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            *self.state.write() = WorkerState::Stopping;
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(consumer = %self.config.consumer, error = %e, "Consumer worker task failed");
            }
        }

        *self.state.write() = WorkerState::Stopped;
        info!(consumer = %self.config.consumer, "Consumer worker stopped");
    }

    async fn run(
        transport: Arc<StreamTransport>,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = interval(config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!(consumer = %config.consumer, "Shutdown signal received");
                    return;
                }
                _ = ticker.tick() => {
                    Self::poll_once(&transport, &config, handler.as_ref()).await;
                }
            }
        }
    }

    /// Run a single read, handle and acknowledge cycle.
    pub async fn poll_once(
        transport: &StreamTransport,
        config: &ConsumerConfig,
        handler: &dyn MessageHandler,
    ) -> PollSummary {
        let deliveries = transport
            .read_group(
                &config.log_key,
                &config.group,
                &config.consumer,
                config.batch_size,
            )
            .await;

        let mut summary = PollSummary {
            delivered: deliveries.len(),
            ..PollSummary::default()
        };

        for delivery in &deliveries {
            match handler.handle(delivery).await {
                HandlerOutcome::Ack => {
                    transport
                        .acknowledge(&config.log_key, &config.group, delivery.id)
                        .await;
                    summary.acked += 1;
                }
                HandlerOutcome::Skip => {
                    debug!(id = %delivery.id, consumer = %config.consumer, "Handler skipped entry");
                    summary.skipped += 1;
                }
            }
        }

        if summary.delivered > 0 {
            debug!(
                log_key = %config.log_key,
                group = %config.group,
                consumer = %config.consumer,
                delivered = summary.delivered,
                acked = summary.acked,
                skipped = summary.skipped,
                "Poll cycle complete"
            );
        }

        summary
    }
}

impl Drop for ConsumerWorker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
