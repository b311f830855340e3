use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryNotificationLog, InMemoryPolicyStore, InMemoryTripRepository};
use crate::routes::with_trip_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use travel_desk::config::AppConfig;
use travel_desk::error::AppError;
use travel_desk::telemetry;
use travel_desk::workflows::trips::{NotificationOutbox, TripLifecycleService, TripServiceError};

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
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let notifications = InMemoryNotificationLog::default();
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        notifications: notifications.clone(),
    };

    let (outbox, dispatcher) = NotificationOutbox::channel();
    dispatcher.spawn(Arc::new(notifications));

    let policies = InMemoryPolicyStore::seeded().map_err(TripServiceError::from)?;
    let trip_service = Arc::new(TripLifecycleService::new(
        Arc::new(InMemoryTripRepository::default()),
        Arc::new(policies.clone()),
        Arc::new(outbox),
        config.trips.lifecycle_config(),
    ));

    let app = with_trip_routes(trip_service)
        .layer(Extension(policies))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "travel desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
