//! Extra record fields assembled from command-line flags.
//!
//! Flags are applied in the order given, so a later `--field` overrides the
//! same key from an earlier `--extra-json` object and vice versa. A flag that
//! names a reserved record field fails immediately.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::catalog::RESERVED_FIELDS;

#[derive(Clone, Debug, Default)]
pub struct ExtraFields {
    fields: Map<String, Value>,
}

impl ExtraFields {
    /// `key=value`; the value is kept as a string.
    pub fn set_pair(&mut self, raw: &str, flag: &str) -> Result<()> {
        let (key, value) = split_pair(raw, flag)?;
        self.set(key, Value::String(value.to_string()), flag)
    }

    /// `key=<json>`.
    pub fn set_json_pair(&mut self, raw: &str, flag: &str) -> Result<()> {
        let (key, value) = split_pair(raw, flag)?;
        let parsed: Value = serde_json::from_str(value)
            .with_context(|| format!("{flag} value for '{key}' is not JSON"))?;
        self.set(key, parsed, flag)
    }

    /// Merge every key of an inline JSON object.
    pub fn merge_inline(&mut self, raw: &str, flag: &str) -> Result<()> {
        let value: Value =
            serde_json::from_str(raw).with_context(|| format!("{flag} is not JSON"))?;
        self.merge(value, flag)
    }

    /// Merge every key of a JSON object stored in `path`.
    pub fn merge_file(&mut self, path: &Path, flag: &str) -> Result<()> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading {flag} {}", path.display()))?;
        let value: Value = serde_json::from_str(&data)
            .with_context(|| format!("{flag} {} is not JSON", path.display()))?;
        self.merge(value, flag)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    fn merge(&mut self, value: Value, flag: &str) -> Result<()> {
        let Value::Object(object) = value else {
            bail!("{flag} must be a JSON object");
        };
        for (key, value) in object {
            self.set(key, value, flag)?;
        }
        Ok(())
    }

    fn set(&mut self, key: String, value: Value, flag: &str) -> Result<()> {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            bail!("{flag} may not set reserved record field '{key}'");
        }
        self.fields.insert(key, value);
        Ok(())
    }
}

fn split_pair<'a>(raw: &'a str, flag: &str) -> Result<(String, &'a str)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("{flag} expects key=value, got '{raw}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("{flag} key must not be empty");
    }
    Ok((key.to_string(), value))
}
