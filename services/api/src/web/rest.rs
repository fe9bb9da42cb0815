//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use logosnap_core::{
    ActiveView, FavoriteEntry, FavoriteToggle, Logo, SessionController, SessionError,
    SessionSnapshot,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_session_handler,
        purchase_handler,
        generate_handler,
        set_view_handler,
        list_favorites_handler,
        clear_favorites_handler,
        toggle_favorite_handler,
        remove_favorite_handler,
        favorite_image_handler,
        temp_image_handler,
        download_handler,
    ),
    components(
        schemas(
            SessionResponse,
            LogoResponse,
            BatchResponse,
            FavoriteResponse,
            GenerateRequest,
            ViewRequest,
            ViewDto,
            ToggleFavoriteResponse,
            ClearFavoritesResponse,
        )
    ),
    tags(
        (name = "LogoSnap API", description = "Generate logos from a prompt, keep favorites and download them.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewDto {
    Generate,
    Favorites,
}

impl From<ActiveView> for ViewDto {
    fn from(view: ActiveView) -> Self {
        match view {
            ActiveView::Generate => ViewDto::Generate,
            ActiveView::Favorites => ViewDto::Favorites,
        }
    }
}

impl From<ViewDto> for ActiveView {
    fn from(view: ViewDto) -> Self {
        match view {
            ViewDto::Generate => ActiveView::Generate,
            ViewDto::Favorites => ActiveView::Favorites,
        }
    }
}

/// One logo of the current batch.
#[derive(Serialize, ToSchema)]
pub struct LogoResponse {
    pub id: Uuid,
    pub prompt: String,
    /// Temporary URL, valid until the batch is replaced.
    pub image_url: Option<String>,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub is_favorite: bool,
}

/// The state the presentation layer renders.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub has_paid: bool,
    pub credits_remaining: u32,
    pub current_batch: Vec<LogoResponse>,
    pub favorites_count: usize,
    pub favorites_capacity: usize,
    pub active_view: ViewDto,
    pub is_generating: bool,
}

#[derive(Serialize, ToSchema)]
pub struct BatchResponse {
    pub prompt: String,
    pub logos: Vec<LogoResponse>,
    pub credits_remaining: u32,
}

#[derive(Serialize, ToSchema)]
pub struct FavoriteResponse {
    pub id: Uuid,
    pub prompt: String,
    pub image_url: String,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub favorited_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ViewRequest {
    pub view: ViewDto,
}

#[derive(Serialize, ToSchema)]
pub struct ToggleFavoriteResponse {
    pub logo_id: Uuid,
    pub is_favorite: bool,
    /// Set when the oldest favorite was dropped to make room.
    pub evicted: Option<Uuid>,
    pub favorites_count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ClearFavoritesResponse {
    pub removed: usize,
}

//=========================================================================================
// Conversions and Helpers
//=========================================================================================

async fn logo_response(session: &SessionController, logo: &Logo) -> LogoResponse {
    LogoResponse {
        id: logo.id,
        prompt: logo.prompt.clone(),
        image_url: logo.image.display_url.clone(),
        source_url: logo.image.source_url.clone(),
        created_at: logo.created_at,
        is_favorite: session.is_favorite(logo.id).await,
    }
}

async fn session_response(session: &SessionController, snapshot: SessionSnapshot) -> SessionResponse {
    let mut current_batch = Vec::with_capacity(snapshot.current_batch.len());
    for logo in &snapshot.current_batch {
        current_batch.push(logo_response(session, logo).await);
    }
    SessionResponse {
        has_paid: snapshot.has_paid,
        credits_remaining: snapshot.credits_remaining,
        current_batch,
        favorites_count: snapshot.favorites_count,
        favorites_capacity: snapshot.favorites_capacity,
        active_view: snapshot.active_view.into(),
        is_generating: snapshot.is_generating,
    }
}

fn favorite_response(entry: &FavoriteEntry) -> FavoriteResponse {
    FavoriteResponse {
        id: entry.logo.id,
        prompt: entry.logo.prompt.clone(),
        image_url: format!("/favorites/{}/image", entry.logo.id),
        source_url: entry.logo.image.source_url.clone(),
        created_at: entry.logo.created_at,
        favorited_at: entry.favorited_at,
    }
}

/// Maps a controller error onto the HTTP status the client should see.
fn session_error_response(e: SessionError) -> (StatusCode, String) {
    let status = match &e {
        SessionError::NoCredits => StatusCode::PAYMENT_REQUIRED,
        SessionError::EmptyPrompt => StatusCode::BAD_REQUEST,
        SessionError::GenerationInProgress | SessionError::FavoritesFull { .. } => {
            StatusCode::CONFLICT
        }
        SessionError::LogoNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Generation { .. } => StatusCode::BAD_GATEWAY,
        SessionError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (status, e.to_string())
}

/// Guesses the image type from its magic bytes.
fn image_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

fn image_response(data: Bytes) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, image_content_type(&data))],
        data,
    )
        .into_response()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Current session state.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Current session", body = SessionResponse))
)]
pub async fn get_session_handler(State(app_state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = &app_state.session;
    Json(session_response(session, session.snapshot().await).await)
}

/// Simulated payment that unlocks the app and grants credits.
#[utoipa::path(
    post,
    path = "/purchase",
    responses((status = 200, description = "Payment accepted", body = SessionResponse))
)]
pub async fn purchase_handler(State(app_state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let session = &app_state.session;
    let snapshot = session.purchase().await;
    Json(session_response(session, snapshot).await)
}

/// Generate a new batch of four logos for a prompt, spending one credit.
#[utoipa::path(
    post,
    path = "/generate",
    request_body = GenerateRequest,
    responses(
        (status = 201, description = "Batch generated", body = BatchResponse),
        (status = 400, description = "Empty prompt"),
        (status = 402, description = "No credits remaining"),
        (status = 409, description = "A generation is already running"),
        (status = 502, description = "The image generator failed; nothing was charged")
    )
)]
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = &app_state.session;
    let batch = session
        .generate(&req.prompt)
        .await
        .map_err(session_error_response)?;

    let mut logos = Vec::with_capacity(batch.logos.len());
    for logo in &batch.logos {
        logos.push(logo_response(session, logo).await);
    }
    let response = BatchResponse {
        prompt: batch.prompt,
        logos,
        credits_remaining: session.snapshot().await.credits_remaining,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Switch between the generate and favorites views.
#[utoipa::path(
    put,
    path = "/view",
    request_body = ViewRequest,
    responses((status = 200, description = "View switched", body = SessionResponse))
)]
pub async fn set_view_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ViewRequest>,
) -> Json<SessionResponse> {
    let session = &app_state.session;
    session.set_active_view(req.view.into()).await;
    Json(session_response(session, session.snapshot().await).await)
}

/// Favorites, newest first.
#[utoipa::path(
    get,
    path = "/favorites",
    responses((status = 200, description = "Favorites, newest first", body = Vec<FavoriteResponse>))
)]
pub async fn list_favorites_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<Vec<FavoriteResponse>> {
    let favorites = app_state.session.list_favorites_newest_first().await;
    Json(favorites.iter().map(favorite_response).collect())
}

/// Remove every favorite.
#[utoipa::path(
    delete,
    path = "/favorites",
    responses((status = 200, description = "Favorites cleared", body = ClearFavoritesResponse))
)]
pub async fn clear_favorites_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<ClearFavoritesResponse> {
    let removed = app_state.session.clear_favorites().await;
    Json(ClearFavoritesResponse { removed })
}

/// Add a logo of the current batch to favorites, or remove it if already there.
#[utoipa::path(
    post,
    path = "/favorites/{id}/toggle",
    params(("id" = Uuid, Path, description = "Logo id")),
    responses(
        (status = 200, description = "Favorite toggled", body = ToggleFavoriteResponse),
        (status = 404, description = "Logo is neither in the current batch nor a favorite"),
        (status = 409, description = "Favorites are full; remove one first")
    )
)]
pub async fn toggle_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ToggleFavoriteResponse>, (StatusCode, String)> {
    let session = &app_state.session;
    let outcome = session
        .toggle_favorite(id)
        .await
        .map_err(session_error_response)?;

    let (is_favorite, evicted) = match outcome {
        FavoriteToggle::Added { evicted } => (true, evicted),
        FavoriteToggle::Removed => (false, None),
    };
    Ok(Json(ToggleFavoriteResponse {
        logo_id: id,
        is_favorite,
        evicted,
        favorites_count: session.snapshot().await.favorites_count,
    }))
}

/// Remove a favorite. Succeeds even if the logo was not a favorite.
#[utoipa::path(
    delete,
    path = "/favorites/{id}",
    params(("id" = Uuid, Path, description = "Logo id")),
    responses((status = 204, description = "Favorite removed"))
)]
pub async fn remove_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    app_state.session.remove_favorite(id).await;
    StatusCode::NO_CONTENT
}

/// Image data of a favorite.
#[utoipa::path(
    get,
    path = "/favorites/{id}/image",
    params(("id" = Uuid, Path, description = "Logo id")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 404, description = "Not a favorite")
    )
)]
pub async fn favorite_image_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let entry = app_state
        .session
        .favorite(id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Favorite {} not found", id)))?;
    Ok(image_response(entry.logo.image.data))
}

/// Image data behind a temporary URL of the current batch.
#[utoipa::path(
    get,
    path = "/images/{key}",
    params(("key" = String, Path, description = "Temporary image key")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 404, description = "Unknown or revoked image")
    )
)]
pub async fn temp_image_handler(
    State(app_state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let data = app_state
        .temp_images
        .get(&key)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Image no longer available".to_string()))?;
    Ok(image_response(data))
}

/// Download a logo from the current batch or from favorites.
#[utoipa::path(
    get,
    path = "/logos/{id}/download",
    params(("id" = Uuid, Path, description = "Logo id")),
    responses(
        (status = 200, description = "Logo file as an attachment"),
        (status = 404, description = "Unknown logo")
    )
)]
pub async fn download_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    let download = app_state
        .session
        .download(id)
        .await
        .map_err(session_error_response)?;

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, image_content_type(&download.data).to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.data,
    )
        .into_response())
}
