pub mod rest;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use rest::{
    clear_favorites_handler, download_handler, favorite_image_handler, generate_handler,
    get_session_handler, list_favorites_handler, purchase_handler, remove_favorite_handler,
    set_view_handler, temp_image_handler, toggle_favorite_handler, ApiDoc,
};
pub use state::AppState;

/// Builds the REST routes plus the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/session", get(get_session_handler))
        .route("/purchase", post(purchase_handler))
        .route("/generate", post(generate_handler))
        .route("/view", put(set_view_handler))
        .route(
            "/favorites",
            get(list_favorites_handler).delete(clear_favorites_handler),
        )
        .route("/favorites/{id}", axum::routing::delete(remove_favorite_handler))
        .route("/favorites/{id}/toggle", post(toggle_favorite_handler))
        .route("/favorites/{id}/image", get(favorite_image_handler))
        .route("/images/{key}", get(temp_image_handler))
        .route("/logos/{id}/download", get(download_handler))
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
