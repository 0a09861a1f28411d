//! Table publication lookup (`GET {base}/table/?query=title:{id}`)

use serde::Deserialize;

/// One hit of the table search endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TablePublication {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Timestamp of the latest publication, as reported by the API
    #[serde(default)]
    pub published: Option<String>,
}

/// The hit describing `table_id`, falling back to the first hit
///
/// A title search can match other tables mentioning the id, so an exact id
/// match wins when present.
pub fn select_publication(table_id: &str, hits: Vec<TablePublication>) -> Option<TablePublication> {
    let exact = hits.iter().position(|hit| hit.id == table_id);
    match exact {
        Some(pos) => hits.into_iter().nth(pos),
        None => hits.into_iter().next(),
    }
}
