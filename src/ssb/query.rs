//! Request bodies for `POST {base}/table/{id}`

use super::metadata::TableDescriptor;
use super::partition::SubQuery;
use serde::Serialize;

/// Response format requested from the table API
pub const RESPONSE_FORMAT: &str = "json-stat2";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableQuery {
    pub query: Vec<QueryItem>,
    pub response: ResponseSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryItem {
    pub code: String,
    pub selection: Selection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub filter: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSpec {
    pub format: String,
}

impl TableQuery {
    /// Query body for one sub-query
    pub fn for_subquery(descriptor: &TableDescriptor, sub: &SubQuery) -> Self {
        let query = sub
            .selections(descriptor)
            .into_iter()
            .map(|selection| QueryItem {
                code: selection.code.to_string(),
                selection: Selection {
                    filter: selection.filter.as_str().to_string(),
                    values: selection.values,
                },
            })
            .collect();

        Self {
            query,
            response: ResponseSpec {
                format: RESPONSE_FORMAT.to_string(),
            },
        }
    }
}
