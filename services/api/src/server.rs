use crate::cli::ServeArgs;
use crate::infra::{open_store, prepare_store, AppState, OpenedStore};
use crate::routes::with_record_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use school_records::config::AppConfig;
use school_records::error::AppError;
use school_records::records::{SchoolRecords, SchoolStore};
use school_records::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    match open_store(&config)? {
        OpenedStore::Memory(store) => serve(config, store).await,
        OpenedStore::Sqlite(store) => serve(config, store).await,
    }
}

async fn serve<S>(config: AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: SchoolStore + 'static,
{
    prepare_store(store.as_ref(), config.storage.seed)?;
    let records = Arc::new(SchoolRecords::new(store, config.records.email_policy));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_record_routes(records)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        environment = config.environment.label(),
        storage = config.storage.backend.label(),
        %addr,
        "school records service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
