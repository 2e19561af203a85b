//! Session-backed identity extractors.
//!
//! Browsing, cart and checkout work for guests. Only the wishlist, order
//! history and the admin pages demand a [`CurrentUser`]. Page requests that
//! lack one are sent to the login form and `/api/*` requests get a 401.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentUser, session_keys};

/// A signed-in shopper.
pub struct RequireAuth(pub CurrentUser);

/// A signed-in shopper with the admin role.
pub struct RequireAdmin(pub CurrentUser);

/// The shopper if signed in. Never rejects.
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Why an identity extractor refused the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Guest on an HTML route.
    SignInRequired,
    /// Guest on a JSON route.
    Unauthorized,
    /// Signed in but not an admin.
    Forbidden,
}

impl AuthRejection {
    /// Nested routers see a stripped `parts.uri`, so the full path comes from
    /// [`OriginalUri`] when the router recorded one.
    fn for_guest(parts: &Parts) -> Self {
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map_or_else(|| parts.uri.path(), |original| original.0.path());
        if path.starts_with("/api/") {
            Self::Unauthorized
        } else {
            Self::SignInRequired
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::SignInRequired => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden => Redirect::to("/unauthorized").into_response(),
        }
    }
}

/// Read the user from the session the session layer attached.
///
/// A missing session layer or an unreadable record both count as a guest.
async fn session_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    match session.get::<CurrentUser>(session_keys::CURRENT_USER).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Session user unreadable; treating as guest");
            None
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_user(parts).await))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match session_user(parts).await {
            Some(user) => Ok(Self(user)),
            None => Err(AuthRejection::for_guest(parts)),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if user.is_admin() {
            return Ok(Self(user));
        }
        tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin denied");
        Err(AuthRejection::Forbidden)
    }
}

/// Sign `user` in on this session, cycling the id so a pre-login cookie
/// cannot be replayed.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Sign out by dropping the whole session, cart and checkout included.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    use super::*;

    async fn wishlist(RequireAuth(_user): RequireAuth) -> &'static str {
        "ok"
    }

    async fn admin_page(RequireAdmin(_user): RequireAdmin) -> &'static str {
        "ok"
    }

    fn nested_router() -> Router {
        Router::new()
            .nest("/api", Router::new().route("/wishlist", get(wishlist)))
            .nest("/admin", Router::new().route("/orders", get(admin_page)))
    }

    async fn send(router: Router, path: &str) -> Response {
        router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn parts(path: &str) -> Parts {
        Request::builder()
            .uri(path)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_guest_on_api_route_is_unauthorized() {
        let mut parts = parts("/api/wishlist");
        let rejection = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection, AuthRejection::Unauthorized);
    }

    #[tokio::test]
    async fn test_guest_on_page_is_sent_to_login() {
        let mut parts = parts("/admin/orders");
        let rejection = RequireAdmin::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection, AuthRejection::SignInRequired);
        assert_eq!(
            rejection.into_response().headers()["location"],
            "/auth/login"
        );
    }

    #[tokio::test]
    async fn test_guest_on_nested_api_route_is_unauthorized() {
        let response = send(nested_router(), "/api/wishlist").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guest_on_nested_page_is_redirected() {
        let response = send(nested_router(), "/admin/orders").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/auth/login");
    }

    #[tokio::test]
    async fn test_optional_auth_accepts_guests() {
        let mut parts = parts("/");
        let OptionalAuth(user) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(user.is_none());
    }
}
