//! JSON Schema check for stored catalogs.
//!
//! The schema ships in `schema/results_catalog.schema.json` and is compiled
//! once per process.

use crate::error::{Error, Result};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::sync::OnceLock;

const CATALOG_SCHEMA_SOURCE: &str = include_str!("../../schema/results_catalog.schema.json");

static CATALOG_SCHEMA: OnceLock<std::result::Result<JSONSchema, String>> = OnceLock::new();

fn compiled_schema() -> Result<&'static JSONSchema> {
    CATALOG_SCHEMA
        .get_or_init(|| {
            let raw: Value = serde_json::from_str(CATALOG_SCHEMA_SOURCE)
                .map_err(|err| format!("parsing catalog schema: {err}"))?;
            JSONSchema::compile(&raw).map_err(|err| format!("compiling catalog schema: {err}"))
        })
        .as_ref()
        .map_err(|message| Error::Internal {
            message: message.clone(),
        })
}

/// Validate a parsed catalog value, reporting every violation as `CorruptCatalog`.
pub(crate) fn validate_catalog_value(key: &str, value: &Value) -> Result<()> {
    let schema = compiled_schema()?;
    if let Err(errors) = schema.validate(value) {
        let details = errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::corrupt(
            key,
            format!("schema validation failed: {details}"),
        ));
    }
    Ok(())
}
