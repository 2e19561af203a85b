//! Login, registration and logout forms.
//!
//! Failures redirect back to the form with an `?error=` code so the page can
//! render a message without holding state.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::routes::session_data;
use crate::services::{AuthError, AuthService, CartService, WishlistService};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
    pub next: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
    pub next: String,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub error: Option<&'static str>,
}

fn error_message(code: &str) -> &'static str {
    match code {
        "credentials" => "Email or password is incorrect.",
        "session" => "We couldn't sign you in. Please try again.",
        "password_mismatch" => "Passwords do not match.",
        "weak_password" => "Password must be at least 8 characters.",
        "invalid_email" => "Please enter a valid email address.",
        "email_taken" => "An account with that email already exists.",
        _ => "Something went wrong. Please try again.",
    }
}

fn success_message(code: &str) -> Option<&'static str> {
    match code {
        "logged_out" => Some("You have been signed out."),
        _ => None,
    }
}

/// Only same-site relative paths are followed after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

// =============================================================================
// Session bootstrap
// =============================================================================

/// How the shopper got an account session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    /// Signed in to an existing account: reconcile the guest cart with the
    /// stored one and load the wishlist.
    Returning,
    /// Just registered: the guest cart becomes the stored cart.
    New,
}

/// Put `user` on the session and bring their stored shopping state in.
///
/// Only a session-store failure is fatal. Cart and wishlist problems are
/// logged and the shopper keeps whatever the session already held.
async fn start_member_session(
    state: &AppState,
    session: &Session,
    user: &CurrentUser,
    arrival: Arrival,
) -> Result<(), tower_sessions::session::Error> {
    set_current_user(session, user).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let mut cart = match session_data::cart(session).await {
        Ok(cart) => cart,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read session cart");
            return Ok(());
        }
    };

    match arrival {
        Arrival::New => {
            if !cart.is_empty()
                && let Err(e) = state.stores().carts.replace(user.id, cart.items()).await
            {
                tracing::warn!(error = %e, "Failed to store guest cart for new account");
            }
        }
        Arrival::Returning => {
            let carts = CartService::new(
                state.stores().carts.as_ref(),
                state.config().cart_sync_policy,
            );
            match carts.sync_with_remote(&mut cart, user.id).await {
                Ok(()) => {
                    if let Err(e) = session_data::save_cart(session, &cart).await {
                        tracing::error!(error = %e, "Failed to store synced cart");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Cart sync on login failed"),
            }

            match WishlistService::new(state.stores().wishlists.as_ref())
                .refresh_wishlist(user.id)
                .await
            {
                Ok(wishlist) => {
                    if let Err(e) = session_data::save_wishlist(session, &wishlist).await {
                        tracing::error!(error = %e, "Failed to store wishlist");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Wishlist refresh on login failed"),
            }
        }
    }

    Ok(())
}

/// Query-string code shown back on the registration form.
fn registration_error_code(err: &AuthError) -> &'static str {
    match err {
        AuthError::WeakPassword(_) => "weak_password",
        AuthError::InvalidEmail(_) => "invalid_email",
        AuthError::UserAlreadyExists => "email_taken",
        other => {
            tracing::error!(error = %other, "Registration failed");
            "failed"
        }
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        error: query.error.as_deref().map(error_message),
        success: query.success.as_deref().and_then(success_message),
        next: safe_next(query.next.as_deref()).to_string(),
    }
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match AuthService::new(state.stores().users.as_ref())
        .sign_in(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            tracing::info!("Login rejected");
            return Redirect::to("/auth/login?error=credentials").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Login failed");
            return Redirect::to("/auth/login?error=failed").into_response();
        }
    };

    let current = CurrentUser::from(&user);
    if let Err(e) = start_member_session(&state, &session, &current, Arrival::Returning).await {
        tracing::error!(error = %e, "Failed to set session");
        return Redirect::to("/auth/login?error=session").into_response();
    }

    tracing::info!(user_id = %user.id, "User logged in");
    Redirect::to(safe_next(form.next.as_deref())).into_response()
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    RegisterTemplate {
        error: query.error.as_deref().map(error_message),
    }
}

/// Handle registration form submission.
///
/// New accounts are signed in straight away; any guest cart carries over.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return Redirect::to("/auth/register?error=password_mismatch").into_response();
    }

    let user = match AuthService::new(state.stores().users.as_ref())
        .register(&form.email, &form.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            let code = registration_error_code(&e);
            return Redirect::to(&format!("/auth/register?error={code}")).into_response();
        }
    };

    let current = CurrentUser::from(&user);
    if let Err(e) = start_member_session(&state, &session, &current, Arrival::New).await {
        tracing::error!(error = %e, "Failed to set session after registration");
        return Redirect::to("/auth/login?error=session").into_response();
    }

    tracing::info!(user_id = %user.id, "User registered");
    Redirect::to("/").into_response()
}

/// Handle logout.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!(error = %e, "Failed to clear session");
    }
    clear_sentry_user();
    Redirect::to("/auth/login?success=logged_out").into_response()
}
