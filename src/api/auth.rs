use crate::api::AppState;
use crate::api::middleware::{RefreshTokenHeader, UserName};
use crate::api::schemas::auth::TokenResponse;
use crate::config::AuthConfig;
use crate::domain::session::TokenPair;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::IntoResponse,
};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Issues a fresh token pair for the user in the `Name` header, ending any session they had.
pub async fn login(State(state): State<AppState>, UserName(user_name): UserName) -> Result<impl IntoResponse> {
    state.session_service.enforce_single_session(&user_name).await?;
    let pair = state.session_service.start_session(&user_name).await?;
    session_response(pair, &state.config.auth)
}

/// Exchanges the refresh token in the `Token` header for a new pair.
pub async fn refresh(
    State(state): State<AppState>,
    RefreshTokenHeader(refresh_token): RefreshTokenHeader,
    UserName(user_name): UserName,
) -> Result<impl IntoResponse> {
    let pair = state.session_service.refresh_session(&refresh_token, &user_name).await?;
    session_response(pair, &state.config.auth)
}

fn session_response(pair: TokenPair, config: &AuthConfig) -> Result<impl IntoResponse + use<>> {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, cookie(ACCESS_TOKEN_COOKIE, &pair.access_token, config.access_token_ttl_secs)?);
    headers.append(SET_COOKIE, cookie(REFRESH_TOKEN_COOKIE, &pair.refresh_token, config.refresh_token_ttl_secs)?);

    Ok((headers, Json(TokenResponse::from(pair))))
}

fn cookie(name: &str, value: &str, max_age_secs: u64) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!("{name}={value}; Max-Age={max_age_secs}; Path=/; HttpOnly"))
        .map_err(|_| AppError::Internal)
}
