//! Filter expression mini-language: `Tid=2019,2020&ContentsCode=Personer1`
//!
//! Parsing is permissive. Fragments without a dimension code or without values
//! are skipped and reported as diagnostics instead of failing the run.

/// Non-fatal problem found while parsing or applying a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDiagnostic {
    /// A `&`-separated fragment that is not `code=v1,v2`
    MalformedFragment(String),
    /// Constraint on a dimension the table does not have
    UnknownDimension(String),
    /// Value not present in the dimension's metadata
    UnknownValue { dimension: String, value: String },
    /// Every listed value was unknown; the dimension is left unfiltered
    EmptyConstraint(String),
    /// Dimension cannot be left out of a query
    NotEliminable(String),
}

impl std::fmt::Display for FilterDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedFragment(fragment) => {
                write!(f, "ignoring malformed filter fragment '{}'", fragment)
            }
            Self::UnknownDimension(code) => {
                write!(f, "ignoring filter on unknown dimension '{}'", code)
            }
            Self::UnknownValue { dimension, value } => write!(
                f,
                "dropping value '{}' not present in dimension '{}'",
                value, dimension
            ),
            Self::EmptyConstraint(code) => write!(
                f,
                "no listed value exists in dimension '{}', leaving it unfiltered",
                code
            ),
            Self::NotEliminable(code) => {
                write!(f, "dimension '{}' cannot be eliminated", code)
            }
        }
    }
}

/// One `code=v1,v2` constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub dimension: String,
    pub values: Vec<String>,
}

/// Parsed filter expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpr {
    pub constraints: Vec<Constraint>,
    pub diagnostics: Vec<FilterDiagnostic>,
}

impl FilterExpr {
    /// Parse a filter expression
    ///
    /// A later constraint on the same dimension replaces the earlier one.
    /// Duplicate values keep their first position.
    pub fn parse(expr: &str) -> Self {
        let mut parsed = FilterExpr::default();

        for fragment in expr.split('&') {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }

            let Some((code, values)) = fragment.split_once('=') else {
                parsed
                    .diagnostics
                    .push(FilterDiagnostic::MalformedFragment(fragment.to_string()));
                continue;
            };

            let code = code.trim();
            let mut listed: Vec<String> = Vec::new();
            for value in values.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                if !listed.iter().any(|v| v == value) {
                    listed.push(value.to_string());
                }
            }

            if code.is_empty() || listed.is_empty() {
                parsed
                    .diagnostics
                    .push(FilterDiagnostic::MalformedFragment(fragment.to_string()));
                continue;
            }

            parsed.constraints.retain(|c| c.dimension != code);
            parsed.constraints.push(Constraint {
                dimension: code.to_string(),
                values: listed,
            });
        }

        parsed
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}
