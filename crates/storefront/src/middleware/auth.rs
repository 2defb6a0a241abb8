//! Authentication extractors.
//!
//! The caller is identified by the `CurrentUser` record the auth service
//! stored in the session. A `CurrentUser` already present in the request
//! extensions (set by an upstream layer) takes precedence over the session.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::{AppError, set_sentry_user};
use crate::models::{CurrentUser, session_keys};

/// Extractor that requires an authenticated user.
///
/// Rejects with `401 UNAUTHORIZED` when no user is logged in.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAuth(user): RequireAuth) -> String {
///     format!("Hello, user {}!", user.id)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires an authenticated admin.
///
/// Rejects with `401 UNAUTHORIZED` when no user is logged in and
/// `403 FORBIDDEN` when the user is not an admin.
pub struct RequireAdmin(pub CurrentUser);

/// Look up the current user in the request extensions, then in the session.
async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    if let Some(user) = parts.extensions.get::<CurrentUser>() {
        return Some(*user);
    }

    let session = parts.extensions.get::<Session>()?;
    match session.get::<CurrentUser>(session_keys::CURRENT_USER).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read current user from session");
            None
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts).await.ok_or(AppError::Unauthorized)?;
        set_sentry_user(&user.id);
        tracing::Span::current().record("user_id", user.id.as_i32());
        Ok(Self(user))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;
    use threadline_core::{UserId, UserRole};

    fn parts(user: Option<CurrentUser>) -> Parts {
        let mut request = Request::builder().uri("/cart").body(()).unwrap();
        if let Some(user) = user {
            request.extensions_mut().insert(user);
        }
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let result = RequireAuth::from_request_parts(&mut parts(None), &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_customer_is_not_admin() {
        let customer = CurrentUser {
            id: UserId::new(1),
            role: UserRole::Customer,
        };
        let mut p = parts(Some(customer));

        assert!(RequireAuth::from_request_parts(&mut p, &()).await.is_ok());
        assert!(matches!(
            RequireAdmin::from_request_parts(&mut p, &()).await,
            Err(AppError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_admin_accepted() {
        let admin = CurrentUser {
            id: UserId::new(2),
            role: UserRole::Admin,
        };
        let RequireAdmin(user) = RequireAdmin::from_request_parts(&mut parts(Some(admin)), &())
            .await
            .unwrap();
        assert_eq!(user, admin);
    }
}
