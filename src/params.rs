//! String-keyed benchmark parameters
//!
//! Parameters cross the process boundary as `--param key=value` arguments, so
//! every value is stored as a string and parsed on demand by the consumer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(String),

    #[error("invalid value '{value}' for parameter '{name}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },

    #[error("malformed parameter assignment '{0}' (expected key=value)")]
    Malformed(String),
}

/// Ordered parameter map handed to a measurement run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, String>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, ParamError> {
        self.get(name)
            .ok_or_else(|| ParamError::Missing(name.to_string()))
    }

    /// Parse a required parameter
    pub fn parse<T>(&self, name: &str) -> Result<T, ParamError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let value = self.require(name)?;
        value.parse().map_err(|e: T::Err| ParamError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse an optional parameter, falling back to `default` when absent
    pub fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ParamError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if self.0.contains_key(name) {
            self.parse(name)
        } else {
            Ok(default)
        }
    }

    /// Parse one `key=value` assignment as given on the command line
    pub fn parse_assignment(raw: &str) -> Result<(String, String), ParamError> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(ParamError::Malformed(raw.to_string())),
        }
    }

    /// Render as `key=value` assignments, in key order
    pub fn to_assignments(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_values() {
        let params = ParamSet::new()
            .with("buffer_size", 4096)
            .with("overwrite", true);
        assert_eq!(params.parse::<usize>("buffer_size").unwrap(), 4096);
        assert!(params.parse::<bool>("overwrite").unwrap());
    }

    #[test]
    fn test_missing_and_invalid() {
        let params = ParamSet::new().with("replication", "three");
        assert_eq!(
            params.parse::<u16>("block_size"),
            Err(ParamError::Missing("block_size".into()))
        );
        assert!(matches!(
            params.parse::<u16>("replication"),
            Err(ParamError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_or_default() {
        let params = ParamSet::new();
        assert_eq!(params.parse_or("file_size_kb", 1024u64).unwrap(), 1024);
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            ParamSet::parse_assignment("path=gs://b/k=v").unwrap(),
            ("path".to_string(), "gs://b/k=v".to_string())
        );
        assert_eq!(
            ParamSet::parse_assignment("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(ParamSet::parse_assignment("novalue").is_err());
        assert!(ParamSet::parse_assignment("=x").is_err());
    }

    #[test]
    fn test_assignments_are_key_ordered() {
        let params = ParamSet::new().with("src", "/a").with("dst", "/b");
        assert_eq!(params.to_assignments(), vec!["dst=/b", "src=/a"]);
    }
}
