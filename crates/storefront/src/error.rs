//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error renders as JSON with an `error` field. Vendor failures answer
//! 502, except payment processor rejections which relay the processor's
//! status code along with its `code` and `type`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use threadline_core::{AddressErrors, CheckoutError};

use crate::catalog::CatalogError;
use crate::db::RepositoryError;
use crate::payments::PaymentError;
use crate::services::auth::AuthError;
use crate::services::checkout::CheckoutFlowError;
use crate::services::webhooks::WebhookError;
use crate::shipping::ShippingError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Checkout step failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutFlowError),

    /// Payment processor call failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Shipping aggregator call failed.
    #[error("Shipping error: {0}")]
    Shipping(#[from] ShippingError),

    /// CMS query failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Webhook could not be processed.
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Session store read or write failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Field-level validation failures.
    #[error("Validation failed: {0}")]
    Validation(#[from] AddressErrors),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        Self::Checkout(err.into())
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Auth(err) => auth_status(err),
            Self::Checkout(err) => checkout_status(err),
            Self::Payment(err) => relay_status(err),
            Self::Shipping(_) => StatusCode::BAD_GATEWAY,
            Self::Catalog(CatalogError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Catalog(_) => StatusCode::BAD_GATEWAY,
            Self::Webhook(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Webhook(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// JSON body sent to the client. Never carries internal details.
    fn body(&self) -> Value {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                json!({ "error": "Internal server error" })
            }
            Self::Auth(err) => json!({ "error": auth_message(err) }),
            Self::Checkout(err) => checkout_body(err),
            Self::Payment(err) => payment_body(err),
            Self::Shipping(_)
            | Self::Catalog(
                CatalogError::Http(_) | CatalogError::Api { .. } | CatalogError::Parse(_),
            ) => json!({ "error": "External service error" }),
            Self::Webhook(err) if !err.is_client_error() => {
                json!({ "error": "Webhook processing failed" })
            }
            Self::Validation(errors) => validation_body(errors),
            _ => json!({ "error": self.to_string() }),
        }
    }

    fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), Json(self.body())).into_response()
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::UserAlreadyExists => StatusCode::CONFLICT,
        AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
        AuthError::Repository(_) | AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_message(err: &AuthError) -> String {
    match err {
        AuthError::InvalidCredentials => "Invalid credentials".to_string(),
        AuthError::UserAlreadyExists => "An account with this email already exists".to_string(),
        AuthError::WeakPassword(msg) => msg.clone(),
        AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
        AuthError::Repository(_) | AuthError::PasswordHash => "Authentication error".to_string(),
    }
}

fn checkout_status(err: &CheckoutFlowError) -> StatusCode {
    match err {
        CheckoutFlowError::Checkout(CheckoutError::Address(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutFlowError::Checkout(CheckoutError::InvalidTransition { .. }) => {
            StatusCode::CONFLICT
        }
        CheckoutFlowError::Checkout(_) | CheckoutFlowError::Money(_) => StatusCode::BAD_REQUEST,
        CheckoutFlowError::Payment(err) => relay_status(err),
        CheckoutFlowError::PaymentNotSucceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        CheckoutFlowError::Shipping(_) | CheckoutFlowError::OrderCreationFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn checkout_body(err: &CheckoutFlowError) -> Value {
    match err {
        CheckoutFlowError::Checkout(CheckoutError::Address(errors)) => validation_body(errors),
        CheckoutFlowError::Payment(err) => payment_body(err),
        CheckoutFlowError::Shipping(_) => json!({ "error": "External service error" }),
        CheckoutFlowError::OrderCreationFailed {
            payment_intent_id, ..
        } => json!({
            "error": "payment succeeded but order creation failed",
            "paymentIntentId": payment_intent_id,
        }),
        _ => json!({ "error": err.to_string() }),
    }
}

fn relay_status(err: &PaymentError) -> StatusCode {
    StatusCode::from_u16(err.relay_status()).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn payment_body(err: &PaymentError) -> Value {
    let message = match err {
        PaymentError::Api { message, .. } | PaymentError::InvalidAmount(message) => {
            message.clone()
        }
        PaymentError::Http(_) | PaymentError::Parse(_) => "Payment service error".to_string(),
    };
    let mut body = json!({ "error": message });
    if let Some(code) = err.code() {
        body["code"] = json!(code);
    }
    if let Some(error_type) = err.error_type() {
        body["type"] = json!(error_type);
    }
    body
}

fn validation_body(errors: &AddressErrors) -> Value {
    let fields: serde_json::Map<String, Value> = errors
        .errors
        .iter()
        .map(|e| (e.field.to_string(), json!(e.message)))
        .collect();
    json!({ "error": "Validation failed", "fields": fields })
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a checkout or order action.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use threadline_core::{CheckoutStep, FieldError};

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("test".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Shipping(ShippingError::LabelFailed("x".to_string())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(CheckoutError::InvalidTransition {
                from: CheckoutStep::Shipping,
                action: "complete payment",
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Webhook(WebhookError::MissingSignature).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Webhook(WebhookError::Repository(RepositoryError::NotFound)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_order_creation_failure_body() {
        let err = AppError::Checkout(CheckoutFlowError::OrderCreationFailed {
            payment_intent_id: "pi_42".to_string(),
            reason: "database error: pool timed out".to_string(),
        });

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "payment succeeded but order creation failed");
        assert_eq!(body["paymentIntentId"], "pi_42");
        assert!(!body.to_string().contains("pool timed out"));
    }

    #[tokio::test]
    async fn test_payment_error_relays_processor_status() {
        let err = AppError::Payment(PaymentError::Api {
            status: 402,
            message: "Your card was declined.".to_string(),
            code: Some("card_declined".to_string()),
            error_type: Some("card_error".to_string()),
        });

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"], "Your card was declined.");
        assert_eq!(body["code"], "card_declined");
        assert_eq!(body["type"], "card_error");
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let err = AppError::from(CheckoutError::Address(AddressErrors {
            errors: vec![FieldError {
                field: "postal_code",
                message: "postal_code is required".to_string(),
            }],
        }));

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["fields"]["postal_code"], "postal_code is required");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) = body_json(AppError::Internal("secret detail".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }
}
