use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::core::config::UploadConfig;
use crate::features::files::handlers::{self, FilesState};

/// Create routes for the files feature
pub fn routes(state: FilesState, config: &UploadConfig) -> Router {
    Router::new()
        .route(
            "/api/files",
            // Body limit covers the file plus multipart overhead
            post(handlers::upload_file)
                .layer(DefaultBodyLimit::max(config.single_body_limit()))
                .get(handlers::list_files),
        )
        .route(
            "/api/files/batch",
            post(handlers::batch_upload).layer(DefaultBodyLimit::max(config.batch_body_limit())),
        )
        // Stats route must come before {id}
        .route("/api/files/stats", get(handlers::get_stats))
        .route(
            "/api/files/{id}",
            get(handlers::get_file)
                .put(handlers::update_file)
                .delete(handlers::delete_file),
        )
        .route("/api/files/{id}/download", get(handlers::download_file))
        .with_state(state)
}
