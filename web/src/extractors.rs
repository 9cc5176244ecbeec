//! Custom Axum extractors.
//!
//! - [`AuthenticatedActor`]: the caller as asserted by the upstream identity layer
//! - [`ApiJson`]: `Json` whose rejections use the [`AppError`] body

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use request_desk_core::ids::ActorId;
use request_desk_core::request::{Actor, ActorRole};

/// Header carrying the actor's UUID.
pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";

/// Header carrying the actor's role (`investor` or `admin`).
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// The calling actor.
///
/// Identity is established upstream; this extractor only reads the asserted id and role and
/// rejects the request with 401 when either is missing or malformed.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };

        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("Missing {ACTOR_ID_HEADER} header")))?
            .parse::<ActorId>()
            .map_err(|_| AppError::unauthorized(format!("Invalid {ACTOR_ID_HEADER} header")))?;

        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("Missing {ACTOR_ROLE_HEADER} header")))?;
        let role = ActorRole::parse(&role.to_ascii_lowercase())
            .ok_or_else(|| AppError::unauthorized(format!("Invalid {ACTOR_ROLE_HEADER} header")))?;

        Ok(Self(Actor::new(id, role)))
    }
}

/// JSON body extractor that rejects malformed input with a `BAD_REQUEST` [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(headers: &[(&str, &str)]) -> Result<AuthenticatedActor, AppError> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, ()) = builder.body(()).expect("Valid request").into_parts();
        AuthenticatedActor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_from_headers() {
        let id = ActorId::new();
        let raw = id.to_string();
        let actor = extract(&[(ACTOR_ID_HEADER, raw.as_str()), (ACTOR_ROLE_HEADER, "Admin")])
            .await
            .expect("Should extract");

        assert_eq!(actor.0, Actor::admin(id));
    }

    #[tokio::test]
    async fn test_missing_headers_are_unauthorized() {
        let err = extract(&[(ACTOR_ROLE_HEADER, "investor")]).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let id = ActorId::new().to_string();
        let err = extract(&[(ACTOR_ID_HEADER, id.as_str())]).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_headers_are_unauthorized() {
        let err = extract(&[(ACTOR_ID_HEADER, "42"), (ACTOR_ROLE_HEADER, "investor")])
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let id = ActorId::new().to_string();
        let err = extract(&[(ACTOR_ID_HEADER, id.as_str()), (ACTOR_ROLE_HEADER, "root")])
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
