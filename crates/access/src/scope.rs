//! Role-scope resolution
//!
//! A [`DataScope`] is a pure function of the caller's role and user id. The
//! match in [`resolve`] is exhaustive over [`Role`], so a new role cannot
//! compile without an explicit mapping.

use crate::error::ScopeError;
use serde::Serialize;
use trustcore_core::{Identity, Role};

/// Row visibility and response shaping for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataScope {
    own_data_only: bool,
    scoped_user_id: Option<String>,
    assigned_to: Option<String>,
    pii_mask: bool,
    full_pipeline: bool,
}

impl DataScope {
    /// Only applications linked to [`scoped_user_id`](Self::scoped_user_id)
    pub fn own_data_only(&self) -> bool {
        self.own_data_only
    }

    pub fn scoped_user_id(&self) -> Option<&str> {
        self.scoped_user_id.as_deref()
    }

    /// Only applications assigned to this user
    pub fn assigned_to(&self) -> Option<&str> {
        self.assigned_to.as_deref()
    }

    /// Responses must pass through [`mask`](crate::mask::mask)
    pub fn pii_mask(&self) -> bool {
        self.pii_mask
    }

    /// Pipeline-wide views are permitted
    pub fn full_pipeline(&self) -> bool {
        self.full_pipeline
    }

    fn own(user_id: &str) -> Self {
        Self {
            own_data_only: true,
            scoped_user_id: (!user_id.trim().is_empty()).then(|| user_id.to_string()),
            assigned_to: None,
            pii_mask: false,
            full_pipeline: false,
        }
    }

    fn pipeline() -> Self {
        Self {
            own_data_only: false,
            scoped_user_id: None,
            assigned_to: None,
            pii_mask: false,
            full_pipeline: true,
        }
    }
}

/// Derive the scope for an authenticated caller
pub fn resolve(identity: &Identity) -> DataScope {
    scope_for(identity.role(), identity.user_id())
}

/// Derive a scope straight from raw claims.
///
/// An unknown role is a configuration error; there is no fallback scope.
pub fn resolve_claims(role: &str, user_id: &str) -> Result<DataScope, ScopeError> {
    let role = Role::parse_claim(role).map_err(|_| ScopeError::UnmappedRole(role.to_string()))?;
    Ok(scope_for(role, user_id))
}

fn scope_for(role: Role, user_id: &str) -> DataScope {
    match role {
        Role::Borrower => DataScope::own(user_id),
        // Prospects own nothing yet
        Role::Prospect => DataScope {
            scoped_user_id: None,
            ..DataScope::own(user_id)
        },
        Role::LoanOfficer => DataScope {
            assigned_to: Some(user_id.to_string()),
            ..DataScope::pipeline()
        },
        Role::Ceo => DataScope {
            pii_mask: true,
            ..DataScope::pipeline()
        },
        Role::Underwriter | Role::Admin => DataScope::pipeline(),
    }
}
