//! Error tracking helpers built on Sentry.
//!
//! Sentry calls are no-ops until a client is bound (see the CLI's `main`), so
//! stores call these unconditionally.

use crate::api::ApiError;
use crate::models::User;

/// Report a failed API call.
///
/// Only failures on the backend's side (5xx, undecodable bodies) are captured
/// to Sentry; expected outcomes such as validation errors or a missing
/// session stay out of the error stream.
pub fn report_api_error(operation: &str, error: &ApiError) {
    if matches!(error, ApiError::Server { .. } | ApiError::Decode(_)) {
        let event_id = sentry::capture_error(error);
        tracing::error!(
            operation,
            error = %error,
            sentry_event_id = %event_id,
            "API call failed"
        );
    } else {
        tracing::debug!(operation, error = %error, "API call rejected");
    }
}

/// Associate subsequent Sentry events with the signed-in user.
pub fn set_sentry_user(user: &User) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user.id.to_string()),
            email: Some(user.email.clone()),
            username: Some(user.login.clone()),
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

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added product", Some(&[("product_id", "123")]));
/// ```
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
