use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::inference::TypeOverride;

/// Per-column type overrides keyed by `"{table}.{column}"`.
///
/// Keys use sanitized identifiers on both sides, so whoever builds the map
/// must sanitize with the same policy the engine uses. Missing keys mean
/// `Auto`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeOverrides {
    entries: BTreeMap<String, TypeOverride>,
}

impl TypeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(table: &str, column: &str) -> String {
        format!("{table}.{column}")
    }

    pub fn insert(&mut self, table: &str, column: &str, value: TypeOverride) {
        self.entries.insert(Self::key(table, column), value);
    }

    pub fn with(mut self, table: &str, column: &str, value: TypeOverride) -> Self {
        self.insert(table, column, value);
        self
    }

    pub fn get(&self, table: &str, column: &str) -> &TypeOverride {
        static AUTO: TypeOverride = TypeOverride::Auto;
        self.entries.get(&Self::key(table, column)).unwrap_or(&AUTO)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that actually pin a type.
    pub fn fixed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|value| matches!(value, TypeOverride::Fixed(_)))
            .count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening overrides file {path:?}"))?;
        let reader = BufReader::new(file);
        let overrides: TypeOverrides = serde_yaml::from_reader(reader)
            .with_context(|| format!("Parsing overrides YAML {path:?}"))?;
        Ok(overrides)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing overrides to YAML")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml_string()?;
        std::fs::write(path, yaml).with_context(|| format!("Writing overrides file {path:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::SqlType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_keys_default_to_auto() {
        let overrides = TypeOverrides::new().with("sales", "amount", TypeOverride::Fixed(SqlType::Numeric));
        assert_eq!(
            overrides.get("sales", "amount"),
            &TypeOverride::Fixed(SqlType::Numeric)
        );
        assert_eq!(overrides.get("sales", "id"), &TypeOverride::Auto);
        assert_eq!(overrides.get("other", "amount"), &TypeOverride::Auto);
    }

    #[test]
    fn load_reads_yaml_mapping() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "sales.amount: NUMERIC").unwrap();
        writeln!(file, "sales.code: VARCHAR(255)").unwrap();
        writeln!(file, "sales.id: Auto").unwrap();

        let overrides = TypeOverrides::load(file.path()).expect("load overrides");
        assert_eq!(overrides.len(), 3);
        assert_eq!(overrides.fixed_count(), 2);
        assert_eq!(
            overrides.get("sales", "code"),
            &TypeOverride::Fixed(SqlType::Varchar(255))
        );
        assert_eq!(overrides.get("sales", "id"), &TypeOverride::Auto);
    }

    #[test]
    fn load_rejects_unknown_types() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "sales.amount: MONEYISH").unwrap();
        let err = TypeOverrides::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown relational type"));
    }

    #[test]
    fn yaml_output_round_trips_through_load() {
        let overrides = TypeOverrides::new()
            .with("orders", "placed_at", TypeOverride::Fixed(SqlType::Date))
            .with("orders", "id", TypeOverride::Auto);
        let file = NamedTempFile::new().expect("temp file");
        overrides.save(file.path()).expect("save overrides");
        let reloaded = TypeOverrides::load(file.path()).expect("reload overrides");
        assert_eq!(reloaded, overrides);
    }
}
