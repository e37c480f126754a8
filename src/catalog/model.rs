//! Serializable shape of `results/results.json`.
//!
//! The document holds three ordered record lists. Record ids are unique across
//! all three lists combined; [`CatalogDocument::next_id`] is the only place new
//! ids come from.

use crate::catalog::schema::validate_catalog_value;
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Record keys owned by the publisher; caller-supplied extras may not use them.
pub const RESERVED_FIELDS: [&str; 5] = ["id", "path", "title", "desc", "created_at"];

/// Which list of the catalog a record belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Category {
    Figures,
    Tables,
    Artifacts,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Figures, Category::Tables, Category::Artifacts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Figures => "figures",
            Category::Tables => "tables",
            Category::Artifacts => "artifacts",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "figures" => Ok(Category::Figures),
            "tables" => Ok(Category::Tables),
            "artifacts" => Ok(Category::Artifacts),
            other => Err(Error::InvalidArgument(format!(
                "unknown category '{other}' (expected figures|tables|artifacts)"
            ))),
        }
    }
}

/// One published result.
///
/// `extra` is flattened into the record object, so caller fields sit next to
/// the reserved ones in the stored JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: u64,
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "desc")]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Caller-supplied part of a record, before the publisher assigns id, path and
/// timestamp.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordDraft {
    pub title: String,
    pub description: String,
    pub extra: Map<String, Value>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set one extra field; later calls for the same key win.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Merge a whole map of extra fields.
    pub fn extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra.extend(extra);
        self
    }

    /// Fails with `InvalidArgument` if any extra key shadows a reserved field.
    pub fn check_reserved(&self) -> Result<()> {
        let collisions: Vec<&str> = RESERVED_FIELDS
            .iter()
            .copied()
            .filter(|field| self.extra.contains_key(*field))
            .collect();
        if collisions.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "extra fields collide with reserved record fields: {}",
                collisions.join(", ")
            )))
        }
    }
}

/// The whole shared catalog.
///
/// Unknown top-level keys found in a stored document are kept in `other` and
/// written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub figures: Vec<CatalogRecord>,
    #[serde(default)]
    pub tables: Vec<CatalogRecord>,
    #[serde(default)]
    pub artifacts: Vec<CatalogRecord>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl CatalogDocument {
    /// Parse stored catalog bytes, failing closed on anything unexpected.
    ///
    /// `key` only labels the error.
    pub fn from_slice(key: &str, data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|err| Error::corrupt(key, format!("content is not UTF-8: {err}")))?;
        let value: Value = serde_json::from_str(text)
            .map_err(|err| Error::corrupt(key, format!("content is not JSON: {err}")))?;
        validate_catalog_value(key, &value)?;
        let doc: CatalogDocument = serde_json::from_value(value)
            .map_err(|err| Error::corrupt(key, format!("unexpected catalog shape: {err}")))?;
        doc.check_unique_ids(key)?;
        Ok(doc)
    }

    /// Pretty-printed JSON with 2-space indentation.
    pub fn to_pretty_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec_pretty(self)
            .map(Bytes::from)
            .map_err(|err| Error::Internal {
                message: format!("serializing catalog: {err}"),
            })
    }

    pub fn records(&self, category: Category) -> &[CatalogRecord] {
        match category {
            Category::Figures => &self.figures,
            Category::Tables => &self.tables,
            Category::Artifacts => &self.artifacts,
        }
    }

    pub fn records_mut(&mut self, category: Category) -> &mut Vec<CatalogRecord> {
        match category {
            Category::Figures => &mut self.figures,
            Category::Tables => &mut self.tables,
            Category::Artifacts => &mut self.artifacts,
        }
    }

    /// Every id in the document, figures first, then tables, then artifacts.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        Category::ALL
            .into_iter()
            .flat_map(move |category| self.records(category).iter().map(|record| record.id))
    }

    /// `1 + max(id)` across all categories, or 1 for an empty document.
    pub fn next_id(&self) -> u64 {
        self.ids().max().map_or(1, |max| max + 1)
    }

    pub fn len(&self) -> usize {
        Category::ALL
            .into_iter()
            .map(|category| self.records(category).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_unique_ids(&self, key: &str) -> Result<()> {
        let mut seen = BTreeSet::new();
        for id in self.ids() {
            if !seen.insert(id) {
                return Err(Error::corrupt(key, format!("duplicate record id {id}")));
            }
        }
        Ok(())
    }
}
