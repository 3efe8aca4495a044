//! Ghillie reporting server
//!
//! Boot order: configuration, database pool + migrations, store and service
//! wiring, HTTP listener. SIGTERM/ctrl-c trigger a graceful drain.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/ghillie cargo run --bin ghillie_server
//!
//! curl http://localhost:8080/health
//! curl -X POST http://localhost:8080/reports/repositories/octo/reef
//! ```

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use ghillie::api::{create_router, ApiState};
use ghillie::catalogue::StaticCatalogue;
use ghillie::config::AppConfig;
use ghillie::database::{DatabaseConfig, DatabaseManager, GoldStore, SilverStore};
use ghillie::evidence::{EvidenceService, ProjectEvidenceService};
use ghillie::reporting::{
    FilesystemReportSink, ReportSink, ReportingConfig, ReportingService,
};
use ghillie::status_model::build_status_model;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("🚀 Starting Ghillie reporting server");

    let config = AppConfig::from_env().context("invalid configuration")?;

    let db = DatabaseManager::new(DatabaseConfig::new(
        config.database_url.clone(),
        config.database_pool_size,
    ))
    .await
    .context("database connection failed")?;
    db.run_migrations().await.context("migrations failed")?;
    println!("✅ Database ready");

    let silver: Arc<dyn SilverStore> = Arc::new(db.silver());
    let gold: Arc<dyn GoldStore> = Arc::new(db.gold());
    let catalogue = Arc::new(StaticCatalogue::empty(silver.clone()));

    let status_model =
        build_status_model(&config.status_model).context("status model construction failed")?;
    let sink: Option<Arc<dyn ReportSink>> = config
        .report_sink_path
        .as_ref()
        .map(|path| Arc::new(FilesystemReportSink::new(path.clone())) as Arc<dyn ReportSink>);

    let reporting = Arc::new(ReportingService::new(
        silver.clone(),
        gold.clone(),
        EvidenceService::new(silver.clone(), gold.clone()),
        ProjectEvidenceService::new(catalogue, silver.clone(), gold.clone()),
        status_model,
        sink,
        ReportingConfig {
            window_days: config.reporting_window_days,
            validation_max_attempts: config.validation_max_attempts,
        },
    ));

    let app = create_router(ApiState {
        silver,
        reporting,
    })
    .layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    println!("🌐 Server running on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server drained; shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received; draining");
}
