//! Authentication extractors.
//!
//! Shoppers are identified by the session (`current_user`, written by the
//! sign-in collaborator). Operators authenticate with a bearer token.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde_json::json;
use tower_sessions::Session;

use geomarket_core::CartId;

use crate::models::{CurrentShopper, session_keys};
use crate::state::AppState;

/// Extractor that requires a signed-in shopper.
///
/// # Example
///
/// ```rust,ignore
/// async fn checkout(RequireShopper(shopper): RequireShopper) -> impl IntoResponse {
///     format!("Hello, shopper {}!", shopper.id)
/// }
/// ```
pub struct RequireShopper(pub CurrentShopper);

/// Error returned when authentication is required but missing or wrong.
pub enum AuthRejection {
    /// No signed-in shopper.
    SignInRequired,
    /// Missing or wrong operator token.
    InvalidToken,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::SignInRequired => "sign in required",
            Self::InvalidToken => "invalid or missing bearer token",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized", "message": message })),
        )
            .into_response()
    }
}

async fn shopper_from_parts(parts: &Parts) -> Option<CurrentShopper> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentShopper>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

impl<S> FromRequestParts<S> for RequireShopper
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        shopper_from_parts(parts)
            .await
            .map(Self)
            .ok_or(AuthRejection::SignInRequired)
    }
}

/// Extractor that optionally gets the signed-in shopper.
///
/// Unlike `RequireShopper`, this does not reject anonymous requests.
pub struct OptionalShopper(pub Option<CurrentShopper>);

impl OptionalShopper {
    /// The shopper's user id, if signed in.
    #[must_use]
    pub fn user_id(&self) -> Option<geomarket_core::UserId> {
        self.0.as_ref().map(|shopper| shopper.id)
    }
}

impl<S> FromRequestParts<S> for OptionalShopper
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(shopper_from_parts(parts).await))
    }
}

/// Extractor that requires `Authorization: Bearer <ADMIN_API_TOKEN>`.
pub struct RequireOperator;

impl FromRequestParts<AppState> for RequireOperator {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        if bearer_matches(header, state.config().admin_token.expose_secret()) {
            Ok(Self)
        } else {
            tracing::warn!(path = %parts.uri.path(), "Rejected operator request");
            Err(AuthRejection::InvalidToken)
        }
    }
}

/// Check an `Authorization` header value against the expected token.
///
/// Compares in time independent of where the first mismatch is.
#[must_use]
pub fn bearer_matches(header: Option<&str>, expected: &str) -> bool {
    let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
        return false;
    };
    let (token, expected) = (token.trim().as_bytes(), expected.as_bytes());
    if token.len() != expected.len() {
        return false;
    }
    token
        .iter()
        .zip(expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Get the cart ID from the session.
pub async fn get_cart_id(session: &Session) -> Option<CartId> {
    session
        .get::<CartId>(session_keys::CART_ID)
        .await
        .ok()
        .flatten()
}

/// Set the cart ID in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_cart_id(
    session: &Session,
    cart_id: CartId,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CART_ID, cart_id).await
}

/// Forget the session's cart (after checkout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_cart_id(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<CartId>(session_keys::CART_ID).await?;
    Ok(())
}
