//! SchoolEvents worker
//!
//! Main application entry point. Connects the store, wires the services and
//! runs the scheduler until interrupted.

use std::sync::Arc;
use tracing::{info, warn};

use SchoolEvents::{
    config::Settings,
    database::{create_pool, run_migrations, DatabaseService, Store},
    scheduler::SchedulerRunner,
    services::{Broadcaster, Dispatcher, LogNotifier, NoopBroadcaster, RedisBroadcaster, ServiceFactory},
    utils::{clock::SystemClock, logging, Clock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", SchoolEvents::info());

    // Initialize database connection
    info!("Connecting to database...");
    let db_pool = create_pool(&settings.database).await?;

    // Run database migrations
    run_migrations(&db_pool).await?;

    let store: Arc<dyn Store> = Arc::new(DatabaseService::new(db_pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Realtime is best-effort; a missing Redis only disables live updates
    let redis_broadcaster = if settings.redis.enabled {
        info!("Connecting to Redis...");
        match RedisBroadcaster::new(settings.redis.clone()).await {
            Ok(broadcaster) => Some(broadcaster),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, realtime broadcasts disabled");
                None
            }
        }
    } else {
        None
    };

    let broadcaster: Arc<dyn Broadcaster> = match &redis_broadcaster {
        Some(redis) => Arc::new(redis.clone()),
        None => Arc::new(NoopBroadcaster),
    };
    let dispatcher = Dispatcher::new(Arc::new(LogNotifier), broadcaster);

    // Initialize services
    info!("Initializing services...");
    let mut services = ServiceFactory::new(&settings, store.clone(), dispatcher.clone(), clock.clone());
    if let Some(redis) = redis_broadcaster {
        services = services.with_redis(redis);
    }

    let health = services.health_check().await;
    for issue in health.get_issues() {
        warn!(issue = %issue, "Service health issue");
    }
    if !health.is_healthy() {
        anyhow::bail!("Critical services unhealthy: {}", health.get_issues().join("; "));
    }

    let mut scheduler = SchedulerRunner::new(store, dispatcher.clone(), clock, settings.scheduler.clone());
    if settings.scheduler.enabled {
        scheduler.start();
    } else {
        info!("Scheduler disabled by configuration");
    }

    info!("SchoolEvents is ready!");

    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested, stopping scheduler...");
    scheduler.stop();
    dispatcher.settle().await;

    info!("SchoolEvents has been shut down.");

    Ok(())
}
