//! Table metadata and the derived sizing facts used for partitioning
//!
//! `TableDescriptor` is built once per table: metadata is fetched, the recipe
//! and filter expression narrow the dimensions, and the region/time/scope
//! roles plus slice and total sizes are derived. It is read-only afterwards.

use super::client::SsbClient;
use super::error::{Result, SsbError};
use super::filter::{Constraint, FilterDiagnostic, FilterExpr};
use super::recipe::Recipe;
use polars::prelude::*;
use serde::Deserialize;

/// Metadata document returned by `GET {base}/table/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct TableMetadata {
    #[serde(default)]
    pub title: String,
    pub variables: Vec<VariableMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMetadata {
    pub code: String,
    pub text: String,
    pub values: Vec<String>,
    pub value_texts: Vec<String>,
    /// Whether the API accepts queries that leave this variable out
    #[serde(default)]
    pub elimination: bool,
    #[serde(default)]
    pub time: bool,
}

/// What a dimension means to the partitioner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionRole {
    Region,
    Time,
    /// Accounting scope ("omfang"); always queried with a single value
    Scope,
    Ordinary,
}

/// Value selected for a scope dimension when no recipe says otherwise
pub const DEFAULT_SCOPE_VALUE: &str = "A";

/// Time dimension code used by the table API
pub const TIME_CODE: &str = "Tid";

/// One axis of a table
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub code: String,
    pub text: String,
    pub role: DimensionRole,
    /// Value codes, index-aligned with `value_texts`
    pub values: Vec<String>,
    pub value_texts: Vec<String>,
    pub elimination: bool,
    /// Left out of queries; counts as a single row
    pub eliminated: bool,
    /// Single value every query selects (scope dimensions)
    pub forced_value: Option<String>,
}

impl Dimension {
    /// Rows this dimension contributes when queried as-is
    pub fn query_len(&self) -> u64 {
        if self.eliminated || self.forced_value.is_some() {
            1
        } else {
            self.values.len() as u64
        }
    }

    pub fn text_of(&self, value: &str) -> Option<&str> {
        self.values
            .iter()
            .position(|v| v == value)
            .map(|idx| self.value_texts[idx].as_str())
    }

    /// Keep only `keep` (in that order), with texts realigned
    fn restrict(&mut self, keep: &[String]) {
        let texts = keep
            .iter()
            .filter_map(|v| self.text_of(v).map(str::to_string))
            .collect();
        self.values = keep.to_vec();
        self.value_texts = texts;
    }
}

fn is_region_variable(var: &VariableMetadata) -> bool {
    var.text.eq_ignore_ascii_case("region")
        || matches!(var.code.as_str(), "Region" | "KOKkommuneregion0000")
}

fn is_scope_variable(var: &VariableMetadata) -> bool {
    let text = var.text.to_lowercase();
    text.contains("omfang") || text.contains("scope")
}

/// Immutable, filtered view of one table's dimensions
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    table_id: String,
    title: String,
    dimensions: Vec<Dimension>,
    region_index: Option<usize>,
    time_index: Option<usize>,
    slice_size: u64,
    total_size: u64,
    periods: Option<usize>,
    diagnostics: Vec<FilterDiagnostic>,
}

impl TableDescriptor {
    /// Fetch metadata for `table_id` and build the descriptor
    pub async fn fetch(
        client: &SsbClient,
        table_id: &str,
        filter: Option<&str>,
        recipe: Option<&Recipe>,
    ) -> Result<Self> {
        let metadata = client.table_metadata(table_id).await?;
        let descriptor = Self::from_metadata(table_id, metadata, filter, recipe)?;

        tracing::info!(
            table = table_id,
            dimensions = descriptor.dimensions.len(),
            region = ?descriptor.region_dimension().map(|d| d.code.as_str()),
            time = ?descriptor.time_dimension().map(|d| d.code.as_str()),
            slice_size = descriptor.slice_size,
            total_size = descriptor.total_size,
            "Table descriptor ready"
        );
        Ok(descriptor)
    }

    /// Build from already-fetched metadata
    ///
    /// The recipe is applied first (filter, prefixes, eliminations), then the
    /// caller's filter expression. Problems with either are recorded as
    /// diagnostics, never as errors. Only metadata whose value codes and texts
    /// disagree in length is rejected.
    pub fn from_metadata(
        table_id: &str,
        metadata: TableMetadata,
        filter: Option<&str>,
        recipe: Option<&Recipe>,
    ) -> Result<Self> {
        let mut dimensions = Vec::with_capacity(metadata.variables.len());
        let mut region_index = None;
        let mut time_index = None;

        for (idx, var) in metadata.variables.into_iter().enumerate() {
            if var.values.len() != var.value_texts.len() {
                return Err(SsbError::MetadataFetch {
                    table_id: table_id.to_string(),
                    reason: format!(
                        "variable '{}' has {} values but {} value texts",
                        var.code,
                        var.values.len(),
                        var.value_texts.len()
                    ),
                });
            }

            let role = if region_index.is_none() && is_region_variable(&var) {
                region_index = Some(idx);
                DimensionRole::Region
            } else if time_index.is_none() && (var.code == TIME_CODE || var.time) {
                time_index = Some(idx);
                DimensionRole::Time
            } else if is_scope_variable(&var) {
                DimensionRole::Scope
            } else {
                DimensionRole::Ordinary
            };

            dimensions.push(Dimension {
                code: var.code,
                text: var.text,
                role,
                values: var.values,
                value_texts: var.value_texts,
                elimination: var.elimination,
                eliminated: false,
                forced_value: None,
            });
        }

        let mut diagnostics = Vec::new();

        if let Some(recipe) = recipe {
            if let Some(expr) = recipe.filter.as_deref() {
                apply_filter(&mut dimensions, expr, &mut diagnostics);
            }
            for (code, prefix) in &recipe.prefix {
                apply_prefix(&mut dimensions, code, prefix, &mut diagnostics);
            }
            for code in &recipe.eliminate {
                eliminate(&mut dimensions, code, &mut diagnostics);
            }
        }

        if let Some(expr) = filter {
            apply_filter(&mut dimensions, expr, &mut diagnostics);
        }

        let scope_override = recipe.and_then(|r| r.scope_value.as_deref());
        for dim in dimensions
            .iter_mut()
            .filter(|d| d.role == DimensionRole::Scope)
        {
            dim.forced_value = scope_value(dim, scope_override);
        }

        for diagnostic in &diagnostics {
            tracing::warn!(table = table_id, "{}", diagnostic);
        }

        let slice_size = dimensions
            .iter()
            .filter(|d| d.role == DimensionRole::Ordinary)
            .map(Dimension::query_len)
            .product();

        let total_size = dimensions
            .iter()
            .map(|d| {
                if d.eliminated {
                    1
                } else {
                    d.values.len() as u64
                }
            })
            .product();

        Ok(Self {
            table_id: table_id.to_string(),
            title: metadata.title,
            dimensions,
            region_index,
            time_index,
            slice_size,
            total_size,
            periods: recipe.and_then(|r| r.periods),
            diagnostics,
        })
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, code: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.code == code)
    }

    pub fn region_index(&self) -> Option<usize> {
        self.region_index
    }

    pub fn time_index(&self) -> Option<usize> {
        self.time_index
    }

    pub fn region_dimension(&self) -> Option<&Dimension> {
        self.region_index.map(|idx| &self.dimensions[idx])
    }

    pub fn time_dimension(&self) -> Option<&Dimension> {
        self.time_index.map(|idx| &self.dimensions[idx])
    }

    /// Rows per (region, period) pair
    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    /// Rows of the whole (filtered) table
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Recipe override for the number of recent periods
    pub fn periods(&self) -> Option<usize> {
        self.periods
    }

    pub fn diagnostics(&self) -> &[FilterDiagnostic] {
        &self.diagnostics
    }

    /// One code-to-text lookup frame per dimension: `<code>_kode`, `<code>`
    pub fn label_frames(&self) -> Result<Vec<DataFrame>> {
        self.dimensions
            .iter()
            .map(|dim| {
                let codes = Series::new(format!("{}_kode", dim.code).into(), dim.values.clone());
                let texts = Series::new(dim.code.as_str().into(), dim.value_texts.clone());
                DataFrame::new(vec![codes.into_column(), texts.into_column()])
                    .map_err(SsbError::from)
            })
            .collect()
    }
}

fn apply_filter(dimensions: &mut [Dimension], expr: &str, diagnostics: &mut Vec<FilterDiagnostic>) {
    let parsed = FilterExpr::parse(expr);
    diagnostics.extend(parsed.diagnostics);

    for Constraint { dimension, values } in parsed.constraints {
        let Some(dim) = dimensions.iter_mut().find(|d| d.code == dimension) else {
            diagnostics.push(FilterDiagnostic::UnknownDimension(dimension));
            continue;
        };

        let mut keep = Vec::with_capacity(values.len());
        for value in values {
            if dim.values.contains(&value) {
                keep.push(value);
            } else {
                diagnostics.push(FilterDiagnostic::UnknownValue {
                    dimension: dim.code.clone(),
                    value,
                });
            }
        }

        if keep.is_empty() {
            diagnostics.push(FilterDiagnostic::EmptyConstraint(dim.code.clone()));
        } else {
            dim.restrict(&keep);
        }
    }
}

fn apply_prefix(
    dimensions: &mut [Dimension],
    code: &str,
    prefix: &str,
    diagnostics: &mut Vec<FilterDiagnostic>,
) {
    let Some(dim) = dimensions.iter_mut().find(|d| d.code == code) else {
        diagnostics.push(FilterDiagnostic::UnknownDimension(code.to_string()));
        return;
    };

    let keep: Vec<String> = dim
        .values
        .iter()
        .filter(|v| v.starts_with(prefix))
        .cloned()
        .collect();

    if keep.is_empty() {
        diagnostics.push(FilterDiagnostic::EmptyConstraint(code.to_string()));
    } else {
        dim.restrict(&keep);
    }
}

fn eliminate(dimensions: &mut [Dimension], code: &str, diagnostics: &mut Vec<FilterDiagnostic>) {
    let Some(dim) = dimensions.iter_mut().find(|d| d.code == code) else {
        diagnostics.push(FilterDiagnostic::UnknownDimension(code.to_string()));
        return;
    };

    if !dim.elimination || matches!(dim.role, DimensionRole::Region | DimensionRole::Time) {
        diagnostics.push(FilterDiagnostic::NotEliminable(code.to_string()));
    } else {
        dim.eliminated = true;
    }
}

fn scope_value(dim: &Dimension, preferred: Option<&str>) -> Option<String> {
    preferred
        .filter(|p| dim.values.iter().any(|v| v == p))
        .or_else(|| {
            dim.values
                .iter()
                .find(|v| v.as_str() == DEFAULT_SCOPE_VALUE)
                .map(String::as_str)
        })
        .or_else(|| dim.values.first().map(String::as_str))
        .map(str::to_string)
}
