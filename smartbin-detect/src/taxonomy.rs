//! Class-id taxonomy
//!
//! Static table from the model's raw class id to a waste category and the
//! default labels shown for it. Built once at startup and shared read-only.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Waste category of a model class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Organic,
    Recyclable,
}

impl Category {
    pub fn is_recyclable(self) -> bool {
        matches!(self, Category::Recyclable)
    }
}

/// One taxonomy row, also the shape of a `[[taxonomy]]` TOML entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub class_id: u32,
    pub category: Category,
    /// Display name used when no subtype is chosen
    pub default_type: String,
    /// Material class used when no subtype is chosen
    pub default_class: String,
}

impl TaxonomyEntry {
    pub fn new(class_id: u32, category: Category, default_type: &str, default_class: &str) -> Self {
        Self {
            class_id,
            category,
            default_type: default_type.to_string(),
            default_class: default_class.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    entries: BTreeMap<u32, TaxonomyEntry>,
}

impl Taxonomy {
    /// Stock two-class waste model: 0 = organic, 1 = recyclable
    pub fn builtin() -> Self {
        let entries = [
            TaxonomyEntry::new(0, Category::Organic, "Organic Waste", "Food Waste"),
            TaxonomyEntry::new(1, Category::Recyclable, "Recyclable Item", "Plastic"),
        ];
        Self {
            entries: entries.into_iter().map(|e| (e.class_id, e)).collect(),
        }
    }

    /// Build from configured entries; ids must be unique and the table non-empty
    pub fn from_entries(entries: Vec<TaxonomyEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Config("taxonomy has no entries".to_string()));
        }
        let mut map = BTreeMap::new();
        for entry in entries {
            let id = entry.class_id;
            if map.insert(id, entry).is_some() {
                return Err(Error::Config(format!("duplicate taxonomy class id {}", id)));
            }
        }
        Ok(Self { entries: map })
    }

    pub fn lookup(&self, class_id: u32) -> Option<&TaxonomyEntry> {
        self.entries.get(&class_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TaxonomyEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}
