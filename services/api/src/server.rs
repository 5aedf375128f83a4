use crate::cli::ServeArgs;
use crate::infra::{build_engine, seed_users, AppState, EngineService};
use crate::routes::with_case_study_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use casework::config::AppConfig;
use casework::error::AppError;
use casework::telemetry;
use casework::workflows::case_study::{Actor, Role};
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CALENDAR_ACTOR: &str = "system-vacation-calendar";

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine = build_engine(config.engine, seed_users());
    if args.calendar_interval_secs > 0 {
        spawn_vacation_calendar(
            engine.service.clone(),
            Duration::from_secs(args.calendar_interval_secs),
        );
    }

    let app = with_case_study_routes(engine.service, config.engine.uploads)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "case study engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_vacation_calendar(service: Arc<EngineService>, every: Duration) {
    tokio::spawn(async move {
        let scheduler = Actor::new(CALENDAR_ACTOR, Role::Admin);
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let today = Local::now().date_naive();
            match service.apply_vacation_calendar(&scheduler, today) {
                Ok(toggled) if toggled.is_empty() => {}
                Ok(toggled) => info!(%today, toggled = toggled.len(), "vacation calendar applied"),
                Err(error) => warn!(%today, %error, "vacation calendar sweep failed"),
            }
        }
    });
}
