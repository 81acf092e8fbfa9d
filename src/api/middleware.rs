use crate::error::AppError;
use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;

pub const NAME_HEADER: &str = "name";
pub const TOKEN_HEADER: &str = "token";

/// User identity taken from the `Name` header.
#[derive(Debug)]
pub struct UserName(pub String);

/// Raw refresh token taken from the `Token` header.
#[derive(Debug)]
pub struct RefreshTokenHeader(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserName {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        required_header(parts, NAME_HEADER, "Name").map(Self)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RefreshTokenHeader {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        required_header(parts, TOKEN_HEADER, "Token").map(Self)
    }
}

fn required_header(parts: &Parts, key: &'static str, display_name: &str) -> Result<String, AppError> {
    parts
        .headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| AppError::BadRequest(format!("Header '{display_name}' is missing")))
}

/// Bounds every request by `deadline`. Dropping the handler future on expiry cancels its
/// in-flight store calls and rolls back open transactions. A request that runs out of time
/// failed on our side, so it gets the same 500 as any other infrastructure failure.
pub async fn request_deadline(State(deadline): State<Duration>, request: Request, next: Next) -> Response {
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(timeout_ms = %deadline.as_millis(), "Request deadline exceeded");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal Server Error" }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, middleware::from_fn_with_state, routing::get};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_stalled_request_is_internal_error() {
        let app = Router::new()
            .route("/slow", get(|| async { tokio::time::sleep(Duration::from_secs(5)).await }))
            .route("/fast", get(|| async { "ok" }))
            .layer(from_fn_with_state(Duration::from_millis(100), request_deadline));
        let url = serve(app).await;
        let client = reqwest::Client::new();

        let resp = client.get(format!("{url}/slow")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Internal Server Error");

        let resp = client.get(format!("{url}/fast")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
    }
}
