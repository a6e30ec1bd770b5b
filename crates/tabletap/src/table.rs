//! Table references and name handling
//!
//! A monitored table carries two alias forms for both its schema and its
//! name: the canonical (possibly delimited) SQL identifier and the short
//! system-assigned alias. Catalog lookups accept either form; the resolved
//! [`TableRef`] retains both so later operations can key on whichever form
//! the catalog exposes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object labels are limited by the catalog to this many characters.
pub const MAX_LABEL_LEN: usize = 50;

const LABEL_PREFIX: &str = "tabletap";

/// Identity of a monitored table, carrying both alias forms for schema and
/// name. Constructed transiently per lookup; never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Canonical (possibly delimited) schema name
    pub schema: String,
    /// Short system-assigned schema alias
    pub system_schema: String,
    /// Canonical (possibly delimited) table name
    pub name: String,
    /// Short system-assigned table alias
    pub system_name: String,
}

impl TableRef {
    pub fn new(
        schema: impl Into<String>,
        system_schema: impl Into<String>,
        name: impl Into<String>,
        system_name: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            system_schema: system_schema.into(),
            name: name.into(),
            system_name: system_name.into(),
        }
    }

    /// Descriptive label for objects generated for this table (trigger,
    /// staging variable, event queue).
    ///
    /// Picks the fullest qualified name that fits [`MAX_LABEL_LEN`], giving
    /// preference to the table name over the schema. Returns an empty
    /// string when no candidate fits; labeling is cosmetic and the caller
    /// may skip it.
    pub fn label_text(&self) -> String {
        let candidates = [
            (&self.schema, &self.name),
            (&self.system_schema, &self.name),
            (&self.schema, &self.system_name),
            (&self.system_schema, &self.system_name),
        ];
        candidates
            .iter()
            .map(|(schema, name)| format!("{LABEL_PREFIX} - {schema}.{name}"))
            .find(|label| label.len() <= MAX_LABEL_LEN)
            .unwrap_or_default()
    }

    /// True when `schema`/`table` inputs match this table through either
    /// alias form (canonical or system) of each part.
    pub fn matches(&self, schema: &str, table: &str) -> bool {
        (self.schema == schema || self.system_schema == schema)
            && (self.name == table || self.system_name == table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Normalize an operator-supplied schema or table name.
///
/// Delimited names (surrounded by double quotes) pass through untouched;
/// everything else folds to uppercase. The operator must explicitly delimit
/// names that require it.
pub fn normalize_name(name: &str) -> String {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        name.to_string()
    } else {
        name.to_uppercase()
    }
}
