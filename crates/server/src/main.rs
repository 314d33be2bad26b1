use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{item_image, upload_items, UploadFile, MAX_UPLOAD_BYTES, MAX_UPLOAD_FILES};
use shared::{
    domain::{ItemId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{Action, ActionRequest, ActionResponse, ProtocolError, INVALID_ITEM_IDS_MESSAGE},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod bridge;
mod config;

use app_state::{build_api_context, AppState};
use config::{load_settings, prepare_database_url};

/// Room for multipart framing on top of the photo bytes themselves.
const MAX_UPLOAD_REQUEST_BYTES: usize = MAX_UPLOAD_FILES * MAX_UPLOAD_BYTES + 64 * 1024;

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = match Storage::new(&database_url).await {
        Ok(storage) => Some(storage),
        Err(error) => {
            error!(
                %database_url,
                %error,
                "failed to open SQLite database; account and wardrobe actions will fail"
            );
            None
        }
    };
    let api = build_api_context(&settings, storage)?;
    let app = build_router(Arc::new(AppState::new(api, settings.action_timeout())));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(bridge_page))
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route(
            "/api/upload",
            post(upload)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_REQUEST_BYTES)),
        )
        .route("/api/items/:item_id/image", get(download_image))
        .route("/api/:action", get(api_action))
        .with_state(state)
}

fn api_error(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(code, message)))
}

async fn bridge_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Html<String>> {
    let pending = bridge::dispatch(&state.api, &params, state.action_timeout).await;
    let page = bridge::render_page(&pending, bridge::carries_action(&params)).map_err(|e| {
        error!(error = %e, "failed to render page");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, e.to_string())
    })?;
    Ok(Html(page))
}

async fn api_action(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ActionResponse>> {
    let action: Action = action.parse().map_err(|e: ProtocolError| {
        api_error(StatusCode::NOT_FOUND, ErrorCode::NotFound, e.to_string())
    })?;
    let response = match ActionRequest::decode(action, &params) {
        Ok(request) => bridge::run_action(&state.api, request, state.action_timeout).await,
        Err(e) => {
            warn!(%action, error = %e, "rejecting request");
            ActionResponse::failure(INVALID_ITEM_IDS_MESSAGE)
        }
    };
    Ok(Json(response))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ActionResponse>> {
    let mut user_id = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        let status = e.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            ErrorCode::PayloadTooLarge
        } else {
            ErrorCode::Validation
        };
        api_error(status, code, e.body_text())
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "user_id" => {
                let value = field.text().await.map_err(|e| {
                    api_error(e.status(), ErrorCode::Validation, e.body_text())
                })?;
                user_id = Some(UserId::from(value.trim()));
            }
            "files" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    api_error(e.status(), ErrorCode::PayloadTooLarge, e.body_text())
                })?;
                files.push(UploadFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            other => warn!(field = %other, "ignoring unexpected multipart field"),
        }
    }

    let user_id = user_id
        .filter(|id| !id.as_str().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, ErrorCode::Validation, "user_id is required"))?;
    Ok(Json(upload_items(&state.api, &user_id, files).await))
}

async fn download_image(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<String>,
    Query(q): Query<UserQuery>,
) -> ApiResult<impl IntoResponse> {
    let image = item_image(&state.api, &UserId::from(q.user_id), &ItemId::from(item_id))
        .await
        .map_err(|e| {
            let status = match e.code {
                ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(e))
        })?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, ErrorCode::NotFound, "image not found"))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&image.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=86400"));
    Ok((StatusCode::OK, headers, image.bytes))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let database = match &state.api.storage {
        Some(storage) => match storage.health_check().await {
            Ok(()) => "ok",
            Err(e) => {
                warn!(error = %e, "database health check failed");
                "unavailable"
            }
        },
        None => "not_configured",
    };
    let configured = |present: bool| if present { "ok" } else { "not_configured" };
    let weather = configured(state.api.weather.is_some());
    let ai = configured(state.api.advisor.is_some());

    let status = if [database, weather, ai].iter().all(|s| *s == "ok") {
        "healthy"
    } else {
        "degraded"
    };
    Json(serde_json::json!({
        "status": status,
        "services": {
            "database": database,
            "weather": weather,
            "ai": ai,
        }
    }))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
