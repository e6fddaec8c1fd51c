// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token middleware for the admin API.
//!
//! When no admin token is configured every request is rejected (fail-closed).

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

/// Admin credentials.
#[derive(Clone)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    /// True when `presented` matches the configured token.
    pub fn accepts(&self, presented: Option<&str>) -> bool {
        match (self.bearer_token.as_deref(), presented) {
            (Some(expected), Some(token)) => !expected.is_empty() && token == expected,
            _ => false,
        }
    }
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Admits requests carrying `Authorization: Bearer <admin_token>`.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.bearer_token.is_none() {
        tracing::error!("admin request refused: server.admin_token is not set");
        return Err(StatusCode::UNAUTHORIZED);
    }
    if !auth.accepts(bearer(&request)) {
        tracing::debug!(path = %request.uri().path(), "admin request with a bad token");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let config = AuthConfig {
            bearer_token: Some("secret-token".to_string()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn accepts_only_the_configured_token() {
        let config = AuthConfig {
            bearer_token: Some("t0k".into()),
        };
        assert!(config.accepts(Some("t0k")));
        assert!(!config.accepts(Some("t0k ")));
        assert!(!config.accepts(None));

        let open = AuthConfig { bearer_token: None };
        assert!(!open.accepts(Some("anything")));
        let empty = AuthConfig {
            bearer_token: Some(String::new()),
        };
        assert!(!empty.accepts(Some("")));
    }
}
