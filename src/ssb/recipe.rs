//! Declarative per-table query recipes
//!
//! Some tables need a narrower selection than "everything": a fixed content
//! code, only functions with a given prefix, a different number of periods.
//! Recipes describe that per table id so the partitioner never has to know
//! about individual tables. Built-in recipes are embedded from recipes.json;
//! a user file can add or replace entries.

use super::error::{Result, SsbError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// recipes.json embedded at compile time
const RECIPES_JSON: &str = include_str!("../../recipes.json");

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Recipe {
    /// Filter expression applied before any user filter
    pub filter: Option<String>,

    /// Keep only values of a dimension that start with the prefix
    pub prefix: BTreeMap<String, String>,

    /// Dimensions left out of the query so the API aggregates over them
    pub eliminate: Vec<String>,

    /// Number of most recent periods instead of the configured default
    pub periods: Option<usize>,

    /// Value selected for the scope dimension instead of the default
    pub scope_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RecipeFile {
    #[serde(default)]
    tables: HashMap<String, Recipe>,
}

/// Recipes keyed by table id
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    recipes: HashMap<String, Recipe>,
}

impl RecipeBook {
    /// The embedded recipes
    ///
    /// Panics if recipes.json is malformed, which cannot happen at runtime since
    /// the file is embedded at compile time.
    pub fn builtin() -> Self {
        Self::from_json(RECIPES_JSON).expect("recipes.json is invalid")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: RecipeFile = serde_json::from_str(json)
            .map_err(|e| SsbError::Config(format!("Invalid recipe document: {}", e)))?;
        Ok(Self {
            recipes: file.tables,
        })
    }

    /// Read a recipe file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SsbError::Config(format!("Cannot read recipe file {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Built-in recipes, with entries from `path` replacing same-id entries
    pub fn builtin_with(path: Option<&Path>) -> Result<Self> {
        let mut book = Self::builtin();
        if let Some(path) = path {
            let user = Self::load(path)?;
            tracing::info!(
                path = %path.display(),
                recipes = user.len(),
                "Loaded user recipes"
            );
            book.extend(user);
        }
        Ok(book)
    }

    pub fn extend(&mut self, other: RecipeBook) {
        self.recipes.extend(other.recipes);
    }

    pub fn insert(&mut self, table_id: impl Into<String>, recipe: Recipe) {
        self.recipes.insert(table_id.into(), recipe);
    }

    pub fn get(&self, table_id: &str) -> Option<&Recipe> {
        self.recipes.get(table_id)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
