mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::{Config, MetadataBackend, StorageBackend};
use crate::core::openapi::ApiDoc;
use crate::core::{database, middleware};
use crate::features::files::handlers::FilesState;
use crate::features::files::services::{LifecycleService, QueryService, UploadService};
use crate::features::files::store::{InMemoryMetadataStore, MetadataStore, PgMetadataStore};
use crate::features::files::routes as files_routes;
use crate::modules::storage::{InMemoryStorage, MinIOClient, StorageAdapter};
use axum::{middleware::from_fn, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "System info: environment={:?}, tokio_worker_threads={}, pid={}",
        config.app.environment,
        worker_threads,
        std::process::id()
    );

    // Metadata store
    let (store, pool) = match &config.metadata {
        MetadataBackend::Postgres(db) => {
            let pool = database::create_pool(db).await?;
            database::run_migrations(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
            let store: Arc<dyn MetadataStore> = Arc::new(PgMetadataStore::new(pool.clone()));
            (store, Some(pool))
        }
        MetadataBackend::Memory => {
            tracing::warn!("Using in-memory metadata store, records are lost on restart");
            let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
            (store, None)
        }
    };

    // Object storage
    let storage: Arc<dyn StorageAdapter> = match &config.storage {
        StorageBackend::MinIO(minio) => {
            let client = MinIOClient::new(minio.clone()).await?;
            tracing::info!("MinIO storage ready: bucket={}", client.bucket_name());
            Arc::new(client)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, content is lost on restart");
            Arc::new(InMemoryStorage::new(format!(
                "http://{}/memory",
                config.app.server_address()
            )))
        }
    };

    let state = FilesState {
        upload_service: Arc::new(UploadService::new(
            &config.upload,
            Arc::clone(&storage),
            Arc::clone(&store),
        )),
        query_service: Arc::new(QueryService::new(
            &config.upload,
            Arc::clone(&storage),
            Arc::clone(&store),
        )),
        lifecycle_service: Arc::new(LifecycleService::new(
            &config.upload,
            Arc::clone(&storage),
            Arc::clone(&store),
        )),
    };
    tracing::info!(
        "File services initialized: max_file_size={}, max_batch_files={}",
        config.upload.max_file_size,
        config.upload.max_batch_files
    );

    let swagger = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Simple health check endpoint
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let mut api = files_routes::routes(state, &config.upload);
    if !config.app.environment.is_production() {
        tracing::info!("Error details enabled in responses");
        api = api.layer(from_fn(middleware::expose_error_details));
    }

    let app = Router::new()
        .merge(swagger)
        .merge(api)
        .merge(health_route)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        .layer(
            ServiceBuilder::new()
                // Generate X-Request-Id using UUID v7 (or use client-provided one)
                .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(middleware::MakeSpanWithRequestId)
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
    socket.set_tcp_keepalive(&keepalive)?;

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database pool closed");
    }
    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
