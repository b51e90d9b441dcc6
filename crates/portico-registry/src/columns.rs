//! Column allow-list parsing.
//!
//! Entries are either a bare column name (`ItemCode`) or a database column
//! with a public alias (`ItemCode;Code`). Lookups are case-insensitive.

use std::collections::HashMap;

use crate::error::DefinitionError;

const SEPARATOR: char = ';';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    alias_to_real: HashMap<String, String>,
    real_to_alias: HashMap<String, String>,
}

impl ColumnMap {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, DefinitionError> {
        let mut map = ColumnMap::default();
        for entry in entries {
            let (real, alias) = parse_entry(entry.as_ref())?;
            map.alias_to_real
                .insert(alias.to_ascii_lowercase(), real.to_string());
            map.real_to_alias
                .insert(real.to_ascii_lowercase(), alias.to_string());
        }
        Ok(map)
    }

    pub fn is_empty(&self) -> bool {
        self.alias_to_real.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alias_to_real.len()
    }

    /// Database column for a public name (alias or unaliased column).
    pub fn real_name(&self, public: &str) -> Option<&str> {
        self.alias_to_real
            .get(&public.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Public name for a database column.
    pub fn alias(&self, real: &str) -> Option<&str> {
        self.real_to_alias
            .get(&real.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// An empty allow-list permits every column.
    pub fn allows(&self, public: &str) -> bool {
        self.is_empty() || self.real_name(public).is_some()
    }
}

fn parse_entry(entry: &str) -> Result<(&str, &str), DefinitionError> {
    let invalid = |reason| DefinitionError::InvalidColumn {
        entry: entry.to_string(),
        reason,
    };

    let trimmed = entry.trim();
    if trimmed.is_empty() {
        return Err(invalid("entry is empty"));
    }
    if trimmed.chars().all(|c| c == SEPARATOR) {
        return Err(invalid("entry contains only separators"));
    }

    let mut parts = trimmed.split(SEPARATOR).map(str::trim);
    let real = parts.next().unwrap_or_default();
    let alias = parts.next();
    if parts.next().is_some() {
        return Err(invalid("expected 'column' or 'column;alias'"));
    }

    match alias {
        None if !real.is_empty() => Ok((real, real)),
        Some(alias) if !real.is_empty() && !alias.is_empty() => Ok((real, alias)),
        _ => Err(invalid("column and alias must both be non-empty")),
    }
}
