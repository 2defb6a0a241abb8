//! Session-related types.
//!
//! The auth service writes these into the session; this service only reads
//! them.

use serde::{Deserialize, Serialize};

use threadline_core::{UserId, UserRole};

/// Session-stored user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's role.
    #[serde(default)]
    pub role: UserRole,
}

impl CurrentUser {
    /// Whether the user may use admin endpoints.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
