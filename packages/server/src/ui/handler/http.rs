//! HTTP API endpoint handlers.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};

use crate::{
    infrastructure::dto::http::{AuthServiceDto, InfoDto, WhoAmIDto},
    ui::state::AppState,
    usecase::RequestInfo,
};

use super::websocket::cookie_value;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Canvas dimensions, palette and login options
pub async fn info(State(state): State<Arc<AppState>>) -> Json<InfoDto> {
    let info = state.get_canvas_usecase.info();

    // Domain Model から DTO への変換
    Json(InfoDto {
        canvas_code: info.canvas_code,
        width: info.width,
        height: info.height,
        palette: info.palette,
        max_stacked: info.max_stacked,
        auth_services: info
            .auth_services
            .into_iter()
            .map(|service| {
                (
                    service.id.clone(),
                    AuthServiceDto {
                        id: service.id,
                        name: service.name,
                    },
                )
            })
            .collect(),
        registration_enabled: info.registration_enabled,
    })
}

/// Raw board bytes, one palette index per cell in row-major order
pub async fn board_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        state.get_canvas_usecase.board_data(),
    )
}

/// The identity this request would connect as. Never creates a user.
pub async fn whoami(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<WhoAmIDto> {
    let request = RequestInfo {
        token: cookie_value(&headers, &state.token_cookie),
        ip: addr.ip().to_string(),
        user_agent: String::new(),
    };

    let dto = match state.resolve_session_usecase.lookup_cached(&request).await {
        Some(active) => WhoAmIDto {
            username: active.user.name.clone(),
            id: i64::try_from(active.id().value()).unwrap_or(i64::MAX),
        },
        None => WhoAmIDto {
            username: "-snip-".to_string(),
            id: -1,
        },
    };
    Json(dto)
}
