//! Session middleware configuration.
//!
//! Sessions are issued by the auth service; this layer only loads them from
//! the shared store so extractors can read the current user. Both services
//! go through `tower-sessions-sqlx-store`, so the record layout in
//! `storefront.session` is the crate's.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "tl_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Schema holding the session table.
const SESSION_SCHEMA: &str = "storefront";

/// Session table, created by migration.
const SESSION_TABLE: &str = "session";

/// `PostgreSQL` session store over `storefront.session`.
///
/// # Errors
///
/// Returns an error if the schema or table name is rejected by the store.
pub fn postgres_session_store(pool: &PgPool) -> Result<PostgresStore, String> {
    PostgresStore::new(pool.clone())
        .with_schema_name(SESSION_SCHEMA)?
        .with_table_name(SESSION_TABLE)
}

/// Create the session layer over the given store.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &StorefrontConfig,
) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    #[tokio::test]
    async fn test_postgres_store_targets_storefront_session_table() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/threadline")
            .unwrap();

        let store = postgres_session_store(&pool).unwrap();
        let _layer = create_session_layer(store, &StorefrontConfig::default());
    }
}
