//! Scoped resources of the general partition
//!
//! Each resource is one table whose rows belong to a loan application. The
//! column list doubles as the whitelist for caller-supplied filters and
//! ordering.

use crate::mask::MaskPattern;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

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
pub enum Resource {
    Applications,
    Documents,
    Financials,
    Conditions,
    RateLocks,
}

impl Resource {
    /// Table name in the general partition
    pub fn table(&self) -> &'static str {
        self.into()
    }

    /// Every selectable column, in result order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Resource::Applications => &[
                "id",
                "status",
                "loan_amount",
                "property_address",
                "assigned_to",
                "ssn",
                "date_of_birth",
                "created_at",
            ],
            Resource::Documents => &[
                "id",
                "application_id",
                "doc_type",
                "file_name",
                "status",
                "uploaded_at",
            ],
            Resource::Financials => &[
                "id",
                "application_id",
                "institution",
                "account_type",
                "account_number",
                "balance",
            ],
            Resource::Conditions => &["id", "application_id", "description", "status", "cleared_at"],
            Resource::RateLocks => &["id", "application_id", "rate", "locked_at", "expires_at"],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Column holding the owning application's id
    pub fn application_key(&self) -> &'static str {
        match self {
            Resource::Applications => "id",
            _ => "application_id",
        }
    }

    /// Fields transformed when the caller's scope requires PII masking
    pub fn mask_fields(&self) -> &'static [(&'static str, MaskPattern)] {
        match self {
            Resource::Applications => &[
                ("ssn", MaskPattern::NationalId),
                ("date_of_birth", MaskPattern::BirthDate),
            ],
            Resource::Financials => &[("account_number", MaskPattern::AccountNumber)],
            Resource::Documents | Resource::Conditions | Resource::RateLocks => &[],
        }
    }
}
