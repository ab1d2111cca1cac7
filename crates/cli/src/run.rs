use std::sync::Arc;

use async_trait::async_trait;
use console::style;
use groupstream::{
    ConsumerConfig, ConsumerWorker, Delivery, HandlerOutcome, MessageHandler, StreamTransport,
    W3cTraceCarrier,
};
use groupstream_store::{LogLifecycleEvent, MemoryLogStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{Context, producer::Producer, settings::Settings};

#[derive(Debug, Clone, Default, PartialEq, clap::Args)]
pub struct RunCommand {
    /// Port for the log store admin server
    #[arg(long, env = "GROUPSTREAM_ADMIN_PORT")]
    pub port: Option<u16>,

    /// Do not start the log store admin server
    #[arg(long = "no-admin")]
    pub no_admin: bool,

    /// Log key used by the producer and every consumer
    #[arg(long = "log-key", short = 'k', env = "GROUPSTREAM_LOG_KEY")]
    pub log_key: Option<String>,

    /// Delay between produced messages in milliseconds (0 disables the producer)
    #[arg(long = "produce-every")]
    pub produce_every_ms: Option<u64>,

    /// Approximate maximum log length
    #[arg(long = "max-length")]
    pub max_length: Option<usize>,

    /// Number of consumers to run, cloned from the first configured consumer
    #[arg(long)]
    pub consumers: Option<usize>,

    /// Acknowledge deliveries as soon as they are read
    #[arg(long = "auto-ack")]
    pub auto_ack: bool,

    /// Do not propagate trace context through messages
    #[arg(long = "no-trace")]
    pub no_trace: bool,
}

impl RunCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<(), String> {
        let settings = self.apply(ctx.settings.clone());

        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        print_banner(&settings);

        let store = MemoryLogStore::with_lifecycle(log_lifecycle);

        let mut transport = StreamTransport::new(store.clone(), settings.transport.clone());
        if settings.telemetry.propagate {
            transport = transport.with_carrier(Arc::new(W3cTraceCarrier));
        }
        let transport = Arc::new(transport);

        if settings.admin.enabled {
            let options = settings.admin.options.clone();
            let store = store.clone();
            tokio::spawn(async move {
                if let Err(e) = groupstream_store::start_server(store, options).await {
                    error!(error = %e, "Log store admin server stopped");
                }
            });
        }

        let producer = settings
            .producer
            .enabled
            .then(|| Producer::spawn(Arc::clone(&transport), settings.producer.clone()));

        let mut workers: Vec<ConsumerWorker> = settings
            .consumers
            .iter()
            .map(|config| {
                let mut worker = ConsumerWorker::new(Arc::clone(&transport), config.clone());
                worker.start(Arc::new(LoggingHandler));
                worker
            })
            .collect();

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

        println!();
        info!("Shutting down");

        if let Some(producer) = producer {
            let produced = producer.stop().await;
            info!(produced, "Producer stopped");
        }
        for worker in &mut workers {
            worker.stop().await;
        }

        let stats = serde_json::to_string(&transport.stats().snapshot())
            .map_err(|e| format!("Failed to serialize statistics: {}", e))?;
        info!(stats = %stats, "Transport statistics");

        Ok(())
    }

    /// Layer command-line overrides on top of file settings
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(port) = self.port {
            settings.admin.options.port = port;
        }
        if self.no_admin {
            settings.admin.enabled = false;
        }
        if let Some(ref log_key) = self.log_key {
            settings.producer.log_key = log_key.clone();
            for consumer in &mut settings.consumers {
                consumer.log_key = log_key.clone();
            }
        }
        match self.produce_every_ms {
            Some(0) => settings.producer.enabled = false,
            Some(interval_ms) => {
                settings.producer.enabled = true;
                settings.producer.interval_ms = interval_ms;
            }
            None => {}
        }
        if let Some(max_length) = self.max_length {
            settings.transport.max_length = max_length;
        }
        if let Some(count) = self.consumers {
            let template = settings.consumers.first().cloned().unwrap_or_else(|| {
                ConsumerConfig::new(
                    settings.producer.log_key.clone(),
                    settings.transport.default_group.clone(),
                    "consumer-1",
                )
            });
            settings.consumers = (1..=count)
                .map(|i| ConsumerConfig {
                    consumer: format!("consumer-{}", i),
                    ..template.clone()
                })
                .collect();
        }
        if self.auto_ack {
            settings.transport.auto_ack = true;
        }
        if self.no_trace {
            settings.telemetry.propagate = false;
        }
        settings
    }
}

fn print_banner(settings: &Settings) {
    println!();
    println!("{}", style("groupstream").green());
    println!("{}", style("Starting stream transport").dim());
    println!();

    if settings.producer.enabled {
        println!(
            "{} {} every {}ms",
            style("Producer").dim(),
            settings.producer.log_key,
            settings.producer.interval_ms
        );
    }
    for consumer in &settings.consumers {
        println!(
            "{} {} / {} / {}",
            style("Consumer").dim(),
            consumer.log_key,
            consumer.group,
            consumer.consumer
        );
    }
    println!();

    if settings.admin.enabled {
        let base = format!(
            "http://{}:{}",
            settings.admin.options.host, settings.admin.options.port
        );
        println!("{}", style("Endpoints").dim());
        println!("  GET    {}/logs", base);
        println!("  GET    {}/logs/{{key}}", base);
        println!("  GET    {}/logs/{{key}}/groups", base);
        println!("  DELETE {}/logs/{{key}}", base);
        println!("  PUT    {}/logs/{{key}}/ttl", base);
        println!();
    }

    println!("{}", style("Press Ctrl+C to stop").dim());
    println!();
}

fn log_lifecycle(event: LogLifecycleEvent) {
    match event {
        LogLifecycleEvent::Created { key, .. } => info!(key = %key, "Log created"),
        LogLifecycleEvent::GroupCreated { key, group, .. } => {
            info!(key = %key, group = %group, "Consumer group created")
        }
        LogLifecycleEvent::Deleted { key, .. } => info!(key = %key, "Log deleted"),
        LogLifecycleEvent::Expired { key, .. } => info!(key = %key, "Log expired"),
    }
}

/// Logs every delivery and acknowledges it
struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, delivery: &Delivery) -> HandlerOutcome {
        match &delivery.parent {
            Some(parent) => info!(
                id = %delivery.id,
                payload = %delivery.payload,
                trace_id = %parent.trace_id_hex(),
                "Consumed message"
            ),
            None => info!(id = %delivery.id, payload = %delivery.payload, "Consumed message"),
        }
        HandlerOutcome::Ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overrides_keeps_settings() {
        let settings = Settings::default();
        assert_eq!(RunCommand::default().apply(settings.clone()), settings);
    }

    #[test]
    fn test_log_key_override_applies_everywhere() {
        let command = RunCommand {
            log_key: Some("orders".to_string()),
            consumers: Some(3),
            ..RunCommand::default()
        };
        let settings = command.apply(Settings::default());

        assert_eq!(settings.producer.log_key, "orders");
        let names: Vec<&str> = settings
            .consumers
            .iter()
            .map(|c| c.consumer.as_str())
            .collect();
        assert_eq!(names, vec!["consumer-1", "consumer-2", "consumer-3"]);
        assert!(settings.consumers.iter().all(|c| c.log_key == "orders"));
    }

    #[test]
    fn test_zero_interval_disables_producer() {
        let command = RunCommand {
            produce_every_ms: Some(0),
            ..RunCommand::default()
        };
        assert!(!command.apply(Settings::default()).producer.enabled);

        let command = RunCommand {
            produce_every_ms: Some(200),
            ..RunCommand::default()
        };
        assert_eq!(command.apply(Settings::default()).producer.interval_ms, 200);
    }

    #[test]
    fn test_flags_override_file_settings() {
        let command = RunCommand {
            port: Some(9999),
            no_admin: true,
            max_length: Some(50),
            auto_ack: true,
            no_trace: true,
            ..RunCommand::default()
        };
        let settings = command.apply(Settings::default());

        assert_eq!(settings.admin.options.port, 9999);
        assert!(!settings.admin.enabled);
        assert_eq!(settings.transport.max_length, 50);
        assert!(settings.transport.auto_ack);
        assert!(!settings.telemetry.propagate);
    }

    #[test]
    fn test_consumers_from_empty_list() {
        let mut settings = Settings::default();
        settings.consumers.clear();

        let command = RunCommand {
            consumers: Some(1),
            ..RunCommand::default()
        };
        let settings = command.apply(settings);
        assert_eq!(settings.consumers.len(), 1);
        assert_eq!(settings.consumers[0].log_key, "events");
        assert_eq!(settings.consumers[0].group, "default");
    }
}
