//! Identity - Per-request caller snapshot
//!
//! Produced by the external identity layer after token validation. This crate
//! never derives or validates identity; it only refuses to build one from a
//! role claim it does not recognise.

use crate::error::{CoreError, CoreResult};
use crate::role::Role;
use serde::{Deserialize, Serialize};

/// Authenticated caller for the lifetime of one request
///
/// Fields are private: an `Identity` cannot be edited in place, and
/// [`Identity::with_role`] returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
    role: Role,
    email: String,
    name: String,
}

impl Identity {
    /// Build an identity from an already-parsed role
    pub fn new(
        user_id: impl Into<String>,
        role: Role,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> CoreResult<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(CoreError::EmptyIdentityField("user_id"));
        }
        Ok(Self {
            user_id,
            role,
            email: email.into(),
            name: name.into(),
        })
    }

    /// Build an identity from raw claims as delivered by the identity layer
    pub fn from_claims(
        user_id: impl Into<String>,
        role_claim: &str,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> CoreResult<Self> {
        let role = Role::parse_claim(role_claim)?;
        Self::new(user_id, role, email, name)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derived identity with a different role; the original is untouched
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}
