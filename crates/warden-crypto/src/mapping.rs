//! Static registry of which record fields are sensitive.
//!
//! Each record type maps to an ordered list of (path, field type) pairs,
//! fixed at compile time. Paths are tagged rather than dot-strings so
//! nested objects and arrays are explicit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    /// A top-level string field.
    Scalar(&'static str),
    /// A string reached through nested objects.
    Nested(&'static [&'static str]),
    /// Every string element of a top-level array.
    ArrayOfScalar(&'static str),
    /// One string field of every object in a top-level array.
    ArrayOfObjectField {
        array: &'static str,
        field: &'static str,
    },
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(name) => f.write_str(name),
            Self::Nested(path) => f.write_str(&path.join(".")),
            Self::ArrayOfScalar(name) => write!(f, "{name}[]"),
            Self::ArrayOfObjectField { array, field } => write!(f, "{array}[].{field}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub path: FieldPath,
    pub field_type: FieldType,
}

const fn map(path: FieldPath, field_type: FieldType) -> FieldMapping {
    FieldMapping { path, field_type }
}

/// Record types whose sensitive fields are encrypted at rest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Account,
    /// Exported security events; read back on the audit path.
    AuditEntry,
}

static ACCOUNT_FIELDS: &[FieldMapping] = &[
    map(FieldPath::Scalar("email"), FieldType::Email),
    map(FieldPath::Scalar("phone"), FieldType::Phone),
    map(FieldPath::Nested(&["address", "street"]), FieldType::Address),
    map(FieldPath::Nested(&["address", "city"]), FieldType::Address),
    map(
        FieldPath::Nested(&["address", "postal_code"]),
        FieldType::Address,
    ),
    map(FieldPath::ArrayOfScalar("backup_codes"), FieldType::BackupCode),
    map(
        FieldPath::ArrayOfObjectField {
            array: "api_credentials",
            field: "secret",
        },
        FieldType::ApiSecret,
    ),
];

static AUDIT_ENTRY_FIELDS: &[FieldMapping] = &[
    map(FieldPath::Scalar("ip_address"), FieldType::PersonalData),
    map(
        FieldPath::Nested(&["details", "email"]),
        FieldType::Email,
    ),
];

impl RecordType {
    pub fn mappings(&self) -> &'static [FieldMapping] {
        match self {
            Self::Account => ACCOUNT_FIELDS,
            Self::AuditEntry => AUDIT_ENTRY_FIELDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_render_for_audit_messages() {
        assert_eq!(FieldPath::Scalar("email").to_string(), "email");
        assert_eq!(
            FieldPath::Nested(&["address", "city"]).to_string(),
            "address.city"
        );
        assert_eq!(
            FieldPath::ArrayOfScalar("backup_codes").to_string(),
            "backup_codes[]"
        );
        assert_eq!(
            FieldPath::ArrayOfObjectField {
                array: "api_credentials",
                field: "secret"
            }
            .to_string(),
            "api_credentials[].secret"
        );
    }

    #[test]
    fn account_mappings_cover_sensitive_fields() {
        let types: Vec<_> = RecordType::Account
            .mappings()
            .iter()
            .map(|m| m.field_type)
            .collect();
        assert!(types.contains(&FieldType::Email));
        assert!(types.contains(&FieldType::BackupCode));
        assert!(types.contains(&FieldType::ApiSecret));
    }
}
