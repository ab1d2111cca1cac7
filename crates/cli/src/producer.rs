use std::{sync::Arc, time::Duration};

use groupstream::{StreamTransport, TraceContext};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::settings::ProducerSettings;

/// Background task appending `<prefix>-<n>` payloads on a fixed cadence
pub struct Producer {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl Producer {
    pub fn spawn(transport: Arc<StreamTransport>, settings: ProducerSettings) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        info!(
            log_key = %settings.log_key,
            interval_ms = settings.interval_ms,
            "Starting producer"
        );

        let handle = tokio::spawn(Self::run(transport, settings, shutdown_rx));

        Producer {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop producing. Returns how many messages were appended.
    pub async fn stop(mut self) -> u64 {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "Producer task failed");
                0
            }),
            None => 0,
        }
    }

    async fn run(
        transport: Arc<StreamTransport>,
        settings: ProducerSettings,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> u64 {
        let mut ticker = interval(Duration::from_millis(settings.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sequence = 0u64;
        let mut appended = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return appended,
                _ = ticker.tick() => {
                    sequence += 1;
                    let payload = format!("{}-{}", settings.payload_prefix, sequence);

                    // Each message starts its own trace
                    let append = transport.append(&settings.log_key, payload.clone(), settings.max_length);
                    match TraceContext::new_root().scope(append).await {
                        Some(id) => {
                            appended += 1;
                            debug!(log_key = %settings.log_key, id = %id, payload = %payload, "Produced message");
                        }
                        None => warn!(log_key = %settings.log_key, payload = %payload, "Message was not appended"),
                    }
                }
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}
