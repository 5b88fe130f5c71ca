//! Input schema discovery and selection
//!
//! The selection never becomes empty. Every mutation returns a patch fragment
//! carrying the selected id list; applying it to the configuration is left to
//! the caller so the configuration store stays the only writer.

use crate::config::{Configuration, Patch, RimeSection};
use crate::error::{Error, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Suffix of schema definition files
pub const SCHEMA_FILE_SUFFIX: &str = ".schema.yaml";

/// An input schema
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub name: String,
}

impl Schema {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    schema: SchemaHeader,
}

#[derive(Deserialize)]
struct SchemaHeader {
    schema_id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Schemas available in a set of directories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, Schema>,
}

impl SchemaCatalog {
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// Scan `*.schema.yaml` files at the top level of each directory.
    ///
    /// Later directories override earlier ones for the same id. Unreadable or
    /// malformed files are skipped with a warning.
    pub fn scan(dirs: &[&Utf8Path]) -> Result<Self> {
        let mut schemas = BTreeMap::new();
        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            let entries = dir
                .read_dir_utf8()
                .map_err(|e| Error::filesystem(*dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| Error::filesystem(*dir, e))?;
                if !entry.file_name().ends_with(SCHEMA_FILE_SUFFIX) || !entry.path().is_file() {
                    continue;
                }
                match read_schema_file(entry.path()) {
                    Ok(schema) => {
                        debug!("Found schema {} in {}", schema.id, entry.path());
                        schemas.insert(schema.id.clone(), schema);
                    }
                    Err(e) => warn!("Skipping schema file {}: {}", entry.path(), e),
                }
            }
        }
        Ok(Self { schemas })
    }

    /// Available schemas ordered by id
    pub fn schemas(&self) -> Vec<Schema> {
        self.schemas.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }
}

fn read_schema_file(path: &Utf8Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
    let file: SchemaFile =
        serde_yaml_ng::from_str(&content).map_err(|e| Error::decode(path.as_str(), e))?;
    let name = file
        .schema
        .name
        .unwrap_or_else(|| file.schema.schema_id.clone());
    Ok(Schema::new(file.schema.schema_id, name))
}

/// Non-empty set of active schemas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSelection {
    selected: BTreeMap<String, Schema>,
}

impl SchemaSelection {
    /// Build a selection; an empty input is rejected
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> Result<Self> {
        let selected: BTreeMap<_, _> = schemas.into_iter().map(|s| (s.id.clone(), s)).collect();
        if selected.is_empty() {
            return Err(Error::EmptySchemaSelection);
        }
        Ok(Self { selected })
    }

    /// Selection from a configuration's `rime.selected-schemas`, names looked
    /// up in `catalog`. Falls back to the first available schema when the
    /// configuration selects nothing.
    pub fn from_configuration(config: &Configuration, catalog: &SchemaCatalog) -> Result<Self> {
        let ids = config.rime().selected_schemas();
        let schemas: Vec<Schema> = ids
            .iter()
            .map(|id| {
                catalog
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| Schema::new(id.clone(), id.clone()))
            })
            .collect();
        if schemas.is_empty() {
            return Self::new(catalog.schemas().into_iter().take(1));
        }
        Self::new(schemas)
    }

    /// Selected schemas ordered by id
    pub fn selected(&self) -> Vec<&Schema> {
        self.selected.values().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.selected.keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected.contains_key(id)
    }

    /// Add `schema` and return the resulting patch fragment
    pub fn select(&mut self, schema: Schema) -> Patch {
        self.selected.insert(schema.id.clone(), schema);
        self.patch()
    }

    /// Remove `id` and return the resulting patch fragment.
    ///
    /// Fails with `LastSchema` when `id` is the only selected schema; the
    /// selection is left unchanged.
    pub fn deselect(&mut self, id: &str) -> Result<Patch> {
        if self.selected.len() == 1 && self.selected.contains_key(id) {
            return Err(Error::LastSchema {
                schema: id.to_string(),
            });
        }
        self.selected.remove(id);
        Ok(self.patch())
    }

    /// Intersect with `available`; if nothing survives, select the first
    /// available schema. Returns true when the selection changed.
    pub fn reconcile(&mut self, available: &SchemaCatalog) -> bool {
        if available.is_empty() {
            return false;
        }

        let kept: BTreeMap<String, Schema> = self
            .selected
            .keys()
            .filter_map(|id| available.get(id).map(|s| (id.clone(), s.clone())))
            .collect();

        let next = if kept.is_empty() {
            available
                .schemas()
                .into_iter()
                .take(1)
                .map(|s| (s.id.clone(), s))
                .collect()
        } else {
            kept
        };

        let changed = next != self.selected;
        self.selected = next;
        changed
    }

    /// Patch fragment carrying the selected id list
    pub fn patch(&self) -> Patch {
        Patch::new(Configuration {
            rime: Some(RimeSection {
                selected_schemas: Some(self.ids()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
