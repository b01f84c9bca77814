use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use examcore_server::extraction::mock::MockExtractionClient;
use examcore_server::extraction::real::HfSpaceExtractionClient;
use examcore_server::extraction::ExtractionClient;
use examcore_server::lms::real::MoodleClient;
use examcore_server::lms::LmsClient;
use examcore_server::notify::{LoggingNotifier, Notifier};
use examcore_server::orchestrator;
use examcore_server::storage::disk_blob::DiskBlobStorage;
use examcore_server::storage::ArtifactStorage;
use examcore_server::{config, db, routes, state};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "examcore_server=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::Config::from_env().context("failed to load configuration")?;
    let encryption_key = cfg.encryption_key_bytes().context("invalid ENCRYPTION_KEY")?;
    let port = cfg.port;

    let pool = db::create_pool(&cfg.database_url).await?;

    if cfg.run_migrations {
        db::run_migrations(&pool).await?;
    } else {
        tracing::info!("skipping migrations (RUN_MIGRATIONS=false)");
    }

    let storage: Arc<dyn ArtifactStorage> = Arc::new(DiskBlobStorage::new(cfg.upload_dir.clone(), pool.clone()));
    let lms: Arc<dyn LmsClient> = Arc::new(MoodleClient::new(&cfg.moodle_base_url)?);
    let extraction: Arc<dyn ExtractionClient> = build_extraction_client(&cfg)?;
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);

    let app_state = state::AppState::new(pool.clone(), cfg, encryption_key, storage.clone(), lms.clone(), extraction, notifier.clone());

    let retry_orchestrator = Arc::new(orchestrator::SubmissionOrchestrator::new(
        app_state.artifacts.clone(),
        storage,
        lms,
        notifier,
    ));
    let _retry_handle = orchestrator::retry_worker::spawn(retry_orchestrator, pool, encryption_key, std::time::Duration::from_secs(60));

    let app = routes::create_router(app_state).layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().include_headers(false)));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();

    let serve = async {
        axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .with_graceful_shutdown(async move {
                drain_rx.await.ok();
                tracing::info!("draining in-flight requests (30 s deadline)...");
            })
            .await
    };

    tokio::select! {
        result = serve => { result?; }
        () = async {
            shutdown_signal().await;
            drain_tx.send(()).ok();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            tracing::warn!("graceful-shutdown drain timeout after 30 s; stopping now");
        } => {}
    }

    tracing::info!("server stopped");
    Ok(())
}

fn build_extraction_client(cfg: &config::Config) -> Result<Arc<dyn ExtractionClient>> {
    match &cfg.hf_space_url {
        Some(url) => Ok(Arc::new(HfSpaceExtractionClient::new(url.clone())?)),
        None => {
            tracing::warn!("HF_SPACE_URL not configured — extraction uploads will always degrade to filename parsing");
            Ok(Arc::new(MockExtractionClient::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl_c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::warn!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
