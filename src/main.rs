use recruitment_pipeline::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    routes,
    services::{notification_service::NotificationService, session_service::EXPIRY_SWEEP_BATCH},
    AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("recruitment_pipeline=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn spawn_notification_worker(notifications: NotificationService) {
    tokio::spawn(async move {
        loop {
            match notifications.run_once().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Notification worker error");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn start_expiry_sweep(state: &AppState, schedule: &str) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create scheduler: {:?}", e))?;
    let sessions = state.session_service.clone();
    let job = Job::new_async(schedule, move |_id, _scheduler| {
        let sessions = sessions.clone();
        Box::pin(async move {
            if let Err(e) = sessions.expire_overdue(EXPIRY_SWEEP_BATCH).await {
                tracing::error!(error = ?e, "Expiry sweep failed");
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("invalid EXPIRY_SWEEP_SCHEDULE '{}': {:?}", schedule, e))?;
    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("failed to add sweep job: {:?}", e))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start scheduler: {:?}", e))?;
    Ok(scheduler)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config()?;
    init_tracing(config.log_json);

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;

    let app_state = AppState::new(pool, config);

    if config.notification_webhook_url.is_some() {
        spawn_notification_worker(app_state.notification_service.clone());
    } else {
        info!("NOTIFICATION_WEBHOOK_URL not set, stage events are recorded but not delivered");
    }

    let _scheduler = start_expiry_sweep(&app_state, &config.expiry_sweep_schedule).await?;
    info!(schedule = %config.expiry_sweep_schedule, "Expiry sweep scheduled");

    let app = routes::router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
