//! Role - Closed set of platform roles
//!
//! Roles arrive from the identity layer as strings. They are parsed exactly once
//! into this enum; everything downstream matches on the variant, so adding or
//! removing a role is a compile-time checked change.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Platform role of an authenticated caller
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform administrator
    Admin,
    /// Visitor without an application yet
    Prospect,
    /// Applicant with one or more loan applications
    Borrower,
    /// Originator working an assigned pipeline
    LoanOfficer,
    /// Credit decision maker
    Underwriter,
    /// Executive with a masked view of the whole pipeline
    Ceo,
}

impl Role {
    /// Wire form of the role (e.g. `loan_officer`)
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Parse a role claim, failing on anything outside the closed set
    pub fn parse_claim(claim: &str) -> Result<Self, CoreError> {
        Role::from_str(claim.trim()).map_err(|_| CoreError::UnknownRole(claim.to_string()))
    }
}
