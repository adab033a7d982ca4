//! Signed-in user snapshot.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Account type as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UserRole {
    #[default]
    #[serde(rename = "Cliente")]
    Customer,
    #[serde(rename = "Administrador")]
    Administrator,
}

/// The user returned by a successful sign-in, kept locally so collection
/// endpoints can be addressed per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    #[serde(rename = "tipo", default)]
    pub role: UserRole,
}

impl UserSnapshot {
    /// Whether the user may use the admin panel.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Administrator)
    }
}
