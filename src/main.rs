use std::sync::Arc;

use async_trait::async_trait;

use givecare::config::ServiceConfig;
use givecare::error::SmsError;
use givecare::schedule::TriggerScheduler;
use givecare::sms::SmsSender;
use givecare::store::{Database, LibSqlBackend};

/// Stand-in sender until a transport integration is wired in. Outbound
/// bodies go to the log so the scheduler loops are observable.
struct LogSender;

#[async_trait]
impl SmsSender for LogSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        tracing::info!(to, body, "Outbound SMS");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env()?;

    let db_path =
        std::env::var("GIVECARE_DB_PATH").unwrap_or_else(|_| "./data/givecare.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );

    eprintln!("💙 GiveCare core v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!(
        "   Trigger batch: every {}s",
        config.trigger_batch_interval.as_secs()
    );

    let scheduler = Arc::new(TriggerScheduler::new(Arc::clone(&db), Arc::new(LogSender)));

    // Periodic batch: recurring triggers first, then one-shot follow-ups
    let tick_interval = config.trigger_batch_interval;
    let batch_scheduler = Arc::clone(&scheduler);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            batch_scheduler.process_due().await;
            batch_scheduler.process_due_messages().await;
        }
    });

    tracing::info!("Scheduler running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
