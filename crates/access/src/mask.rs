//! Fail-closed PII masking
//!
//! Masking runs on response records after scope filtering. Every field in the
//! resource's mask set must be present and transformable; otherwise the whole
//! response fails with [`AccessError::MaskingFailure`] rather than leaking the
//! raw value.

use crate::error::{AccessError, AccessResult};
use crate::resource::Resource;
use crate::scope::DataScope;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// One response row, column name to value
pub type Record = Map<String, Value>;

/// How a designated field is transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPattern {
    /// 9-digit national identifier to `***-**-NNNN`
    NationalId,
    /// `YYYY-MM-DD` to `YYYY-**-**`
    BirthDate,
    /// All digits but the last four replaced with `*`
    AccountNumber,
}

impl MaskPattern {
    pub fn apply(&self, raw: &str) -> Result<String, String> {
        match self {
            MaskPattern::NationalId => mask_national_id(raw),
            MaskPattern::BirthDate => mask_birth_date(raw),
            MaskPattern::AccountNumber => mask_account_number(raw),
        }
    }
}

/// Mask one record according to `scope`
pub fn mask(scope: &DataScope, resource: Resource, mut record: Record) -> AccessResult<Record> {
    if !scope.pii_mask() {
        return Ok(record);
    }

    for &(field, pattern) in resource.mask_fields() {
        let masked = match record.get(field) {
            None => Err("field missing".to_string()),
            Some(Value::String(raw)) => pattern.apply(raw),
            Some(other) => Err(format!("expected string, found {}", json_kind(other))),
        };

        match masked {
            Ok(value) => {
                record.insert(field.to_string(), Value::String(value));
            }
            Err(reason) => {
                warn!(
                    target: "security",
                    resource = %resource,
                    field,
                    %reason,
                    "masking failed, response withheld"
                );
                return Err(AccessError::MaskingFailure {
                    resource,
                    field,
                    reason,
                });
            }
        }
    }

    Ok(record)
}

/// Mask a result set; any failing record fails the whole set
pub fn mask_all(scope: &DataScope, resource: Resource, records: Vec<Record>) -> AccessResult<Vec<Record>> {
    records
        .into_iter()
        .map(|record| mask(scope, resource, record))
        .collect()
}

fn mask_national_id(raw: &str) -> Result<String, String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let well_formed = raw.chars().all(|c| c.is_ascii_digit() || c == '-');
    if !well_formed || digits.len() != 9 {
        return Err("not a 9-digit identifier".to_string());
    }
    Ok(format!("***-**-{}", &digits[5..]))
}

fn mask_birth_date(raw: &str) -> Result<String, String> {
    if raw.len() != 10 {
        return Err("not a YYYY-MM-DD date".to_string());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("not a YYYY-MM-DD date: {}", e))?;
    Ok(format!("{:04}-**-**", date.year()))
}

fn mask_account_number(raw: &str) -> Result<String, String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err("not a numeric account number".to_string());
    }
    // Masking four digits or fewer would reveal the whole number
    if raw.len() <= 4 {
        return Err("account number too short to mask".to_string());
    }
    let visible = &raw[raw.len() - 4..];
    Ok(format!("{}{}", "*".repeat(raw.len() - 4), visible))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::resolve_claims;
    use serde_json::json;

    fn ceo() -> DataScope {
        resolve_claims("ceo", "c-1").unwrap()
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn application() -> Record {
        record(json!({
            "id": "app-1",
            "status": "open",
            "ssn": "123-45-6789",
            "date_of_birth": "1985-03-12",
        }))
    }

    #[test]
    fn test_ceo_sees_masked_application() {
        let masked = mask(&ceo(), Resource::Applications, application()).unwrap();
        assert_eq!(masked["ssn"], "***-**-6789");
        assert_eq!(masked["date_of_birth"], "1985-**-**");
        assert_eq!(masked["status"], "open");
    }

    #[test]
    fn test_unmasked_scope_passes_through() {
        let underwriter = resolve_claims("underwriter", "u-1").unwrap();
        let masked = mask(&underwriter, Resource::Applications, application()).unwrap();
        assert_eq!(masked, application());
    }

    #[test]
    fn test_missing_identifier_fails_closed() {
        let mut rec = application();
        rec.remove("ssn");
        let err = mask(&ceo(), Resource::Applications, rec).unwrap_err();
        assert!(err.is_masking_failure());
        assert!(matches!(err, AccessError::MaskingFailure { field: "ssn", .. }));
    }

    #[test]
    fn test_non_string_and_malformed_values_fail() {
        let cases = [
            ("ssn", json!(123456789)),
            ("ssn", json!("12-345-678")),
            ("ssn", json!("123-45-678X")),
            ("ssn", Value::Null),
            ("date_of_birth", json!("03/12/1985")),
            ("date_of_birth", json!("1985-13-40")),
        ];
        for (field, value) in cases {
            let mut rec = application();
            rec.insert(field.to_string(), value);
            assert!(mask(&ceo(), Resource::Applications, rec).is_err(), "{}", field);
        }
    }

    #[test]
    fn test_account_number_keeps_last_four() {
        let rec = record(json!({ "id": "f-1", "account_number": "000123456789" }));
        let masked = mask(&ceo(), Resource::Financials, rec).unwrap();
        assert_eq!(masked["account_number"], "********6789");

        let short = record(json!({ "id": "f-2", "account_number": "6789" }));
        assert!(mask(&ceo(), Resource::Financials, short).is_err());
    }

    #[test]
    fn test_resources_without_mask_fields_untouched() {
        let rec = record(json!({ "id": "d-1", "file_name": "w2.pdf" }));
        assert_eq!(mask(&ceo(), Resource::Documents, rec.clone()).unwrap(), rec);
    }

    #[test]
    fn test_mask_all_fails_on_any_record() {
        let mut broken = application();
        broken.insert("date_of_birth".to_string(), json!(""));
        let err = mask_all(&ceo(), Resource::Applications, vec![application(), broken]).unwrap_err();
        assert!(err.is_masking_failure());

        let ok = mask_all(&ceo(), Resource::Applications, vec![application(), application()]).unwrap();
        assert!(ok.iter().all(|r| r["ssn"] == "***-**-6789"));
    }

    #[test]
    fn test_unhyphenated_identifier() {
        assert_eq!(MaskPattern::NationalId.apply("123456789").unwrap(), "***-**-6789");
    }
}
