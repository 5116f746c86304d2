use std::sync::Arc;

use ticket_sla_engine::{
    business_time::BusinessCalendar,
    clock::SystemClock,
    config::Config,
    coordinator::TicketCoordinator,
    events::{ChannelEventSink, InMemoryCommentLog},
    keys::KeyAllocator,
    sla::{BreachScanner, SlaTracker},
    store::InMemoryStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_sla_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config {
            engine: Default::default(),
            calendar: Default::default(),
            scanner: Default::default(),
            observability: Default::default(),
        }
    });

    tracing::info!("Starting ticket SLA engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        timezone = %config.calendar.timezone,
        window = %format!("{}-{}", config.calendar.window_start, config.calendar.window_end),
        "Business calendar configured"
    );

    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryStore::new());
    let calendar = BusinessCalendar::from_config(&config.calendar)?;

    let (event_sink, mut event_rx) = ChannelEventSink::new(config.engine.event_queue_size);
    let event_sink = Arc::new(event_sink);

    // Drain outbound events; a real deployment hands these to a
    // notification worker
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            tracing::info!(
                ticket_id = %event.ticket_id,
                kind = %event.kind,
                fingerprint = %event.fingerprint(),
                "Event emitted"
            );
        }
    });

    let allocator = Arc::new(
        KeyAllocator::new(store.clone())
            .with_max_attempts(config.engine.allocation_retries)
            .with_pad_width(config.engine.key_pad_width),
    );

    let tracker = Arc::new(
        SlaTracker::new(store.clone(), store.clone(), calendar, clock.clone())
            .with_conflict_retries(config.engine.conflict_retries),
    );

    let comments = Arc::new(InMemoryCommentLog::new());
    let _coordinator = TicketCoordinator::new(
        store.clone(),
        store.clone(),
        allocator,
        tracker,
        comments,
        event_sink.clone(),
        clock.clone(),
    );
    tracing::info!("Ticket coordinator initialized");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scanner_handle = if config.scanner.enabled {
        let scanner = Arc::new(
            BreachScanner::new(store.clone(), store.clone(), event_sink, clock)
                .with_scan_interval(config.scanner.scan_interval_secs)
                .with_warning_horizon(chrono::Duration::seconds(
                    config.scanner.warning_horizon_secs as i64,
                )),
        );
        let handle = tokio::spawn(scanner.run(shutdown_rx));
        tracing::info!("Breach scanner started");
        Some(handle)
    } else {
        drop(shutdown_rx);
        tracing::info!("Breach scanner disabled in configuration");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Let an in-flight scan finish before the process exits
    if let Some(handle) = scanner_handle {
        let _ = handle.await;
    }

    Ok(())
}
