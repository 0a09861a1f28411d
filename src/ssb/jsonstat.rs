//! json-stat2 cube document to DataFrame conversion
//!
//! A cube lists its dimensions (`id`, `size`), a category map per dimension,
//! and one flat `value` array in row-major order over `size` (the last
//! dimension varies fastest). Each cell becomes one row: a string column per
//! dimension plus a nullable `value` column.

use super::error::{Result, SsbError};
use crate::config::Naming;
use polars::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;

/// Name of the observation column
pub const VALUE_COLUMN: &str = "value";

#[derive(Debug, Clone, Deserialize)]
pub struct CubeDocument {
    pub id: Vec<String>,
    pub size: Vec<usize>,
    pub dimension: HashMap<String, CubeDimension>,
    pub value: CubeValues,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CubeDimension {
    #[serde(default)]
    pub label: Option<String>,
    pub category: CubeCategory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CubeCategory {
    #[serde(default)]
    pub index: Option<CategoryIndex>,
    #[serde(default)]
    pub label: Option<HashMap<String, String>>,
}

/// Category order, either `{"code": position}` or `["code", ...]`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoryIndex {
    Positions(HashMap<String, usize>),
    Ordered(Vec<String>),
}

/// Observations, dense array or sparse `{"position": value}` map
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CubeValues {
    Dense(Vec<Option<f64>>),
    Sparse(HashMap<String, Option<f64>>),
}

impl CubeCategory {
    /// Category codes in cube order
    fn ordered_codes(&self, dimension: &str) -> Result<Vec<String>> {
        match &self.index {
            Some(CategoryIndex::Ordered(codes)) => Ok(codes.clone()),
            Some(CategoryIndex::Positions(positions)) => {
                let mut codes = vec![None; positions.len()];
                for (code, &pos) in positions {
                    let slot = codes.get_mut(pos).ok_or_else(|| {
                        SsbError::Decode(format!(
                            "dimension '{}': category '{}' has position {} out of {}",
                            dimension,
                            code,
                            pos,
                            positions.len()
                        ))
                    })?;
                    *slot = Some(code.clone());
                }
                codes
                    .into_iter()
                    .enumerate()
                    .map(|(pos, code)| {
                        code.ok_or_else(|| {
                            SsbError::Decode(format!(
                                "dimension '{}': no category at position {}",
                                dimension, pos
                            ))
                        })
                    })
                    .collect()
            }
            // A single category may omit the index
            None => match &self.label {
                Some(labels) if labels.len() == 1 => Ok(labels.keys().cloned().collect()),
                _ => Err(SsbError::Decode(format!(
                    "dimension '{}' has no category index",
                    dimension
                ))),
            },
        }
    }
}

/// Decode a cube response body
pub fn decode_cube(body: &str, naming: Naming) -> Result<DataFrame> {
    let cube: CubeDocument = serde_json::from_str(body)
        .map_err(|e| SsbError::Decode(format!("not a json-stat2 document: {}", e)))?;
    cube_to_dataframe(&cube, naming)
}

/// Expand a cube into one row per cell
pub fn cube_to_dataframe(cube: &CubeDocument, naming: Naming) -> Result<DataFrame> {
    if cube.id.len() != cube.size.len() {
        return Err(SsbError::Decode(format!(
            "{} dimension ids but {} sizes",
            cube.id.len(),
            cube.size.len()
        )));
    }

    let nrows: usize = cube.size.iter().product();

    let values: Vec<Option<f64>> = match &cube.value {
        CubeValues::Dense(values) => {
            if values.len() != nrows {
                return Err(SsbError::Decode(format!(
                    "{} values for a cube of {} cells",
                    values.len(),
                    nrows
                )));
            }
            values.clone()
        }
        CubeValues::Sparse(cells) => {
            let mut values = vec![None; nrows];
            for (pos, value) in cells {
                let pos: usize = pos
                    .parse()
                    .map_err(|_| SsbError::Decode(format!("invalid value position '{}'", pos)))?;
                let slot = values.get_mut(pos).ok_or_else(|| {
                    SsbError::Decode(format!("value position {} outside {} cells", pos, nrows))
                })?;
                *slot = *value;
            }
            values
        }
    };

    let mut columns = Vec::with_capacity(cube.id.len() + 1);
    // Row-major: the stride of a dimension is the product of the sizes after it
    let mut stride = nrows;

    for (dim_id, &size) in cube.id.iter().zip(cube.size.iter()) {
        let dimension = cube
            .dimension
            .get(dim_id)
            .ok_or_else(|| SsbError::Decode(format!("dimension '{}' not described", dim_id)))?;

        let codes = dimension.category.ordered_codes(dim_id)?;
        if codes.len() != size {
            return Err(SsbError::Decode(format!(
                "dimension '{}' has {} categories but size {}",
                dim_id,
                codes.len(),
                size
            )));
        }

        let names: Vec<&str> = match naming {
            Naming::Id => codes.iter().map(String::as_str).collect(),
            Naming::Label => codes
                .iter()
                .map(|code| {
                    dimension
                        .category
                        .label
                        .as_ref()
                        .and_then(|labels| labels.get(code))
                        .map(String::as_str)
                        .unwrap_or(code.as_str())
                })
                .collect(),
        };

        stride = if size == 0 { 0 } else { stride / size };
        let cells: Vec<&str> = (0..nrows).map(|row| names[(row / stride) % size]).collect();

        let header = match naming {
            Naming::Id => dim_id.as_str(),
            Naming::Label => dimension.label.as_deref().unwrap_or(dim_id.as_str()),
        };
        columns.push(Series::new(header.into(), cells).into_column());
    }

    columns.push(Series::new(VALUE_COLUMN.into(), values).into_column());

    DataFrame::new(columns).map_err(SsbError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE: &str = r#"{
        "version": "2.0",
        "class": "dataset",
        "label": "07459: Befolkning",
        "id": ["Region", "Kjonn", "Tid"],
        "size": [2, 2, 2],
        "dimension": {
            "Region": {"label": "region", "category": {
                "index": {"0301": 0, "5001": 1},
                "label": {"0301": "Oslo", "5001": "Trondheim"}}},
            "Kjonn": {"label": "kjønn", "category": {
                "index": ["1", "2"],
                "label": {"1": "Menn", "2": "Kvinner"}}},
            "Tid": {"label": "år", "category": {
                "index": {"2020": 0, "2021": 1},
                "label": {"2020": "2020", "2021": "2021"}}}
        },
        "value": [1, 2, 3, 4, 5, 6, null, 8]
    }"#;

    fn column(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn test_row_major_expansion() {
        let df = decode_cube(CUBE, Naming::Id).unwrap();
        assert_eq!(df.height(), 8);
        assert_eq!(df.width(), 4);

        assert_eq!(
            column(&df, "Region"),
            vec!["0301", "0301", "0301", "0301", "5001", "5001", "5001", "5001"]
        );
        assert_eq!(column(&df, "Kjonn"), vec!["1", "1", "2", "2", "1", "1", "2", "2"]);
        assert_eq!(
            column(&df, "Tid"),
            vec!["2020", "2021", "2020", "2021", "2020", "2021", "2020", "2021"]
        );

        let values: Vec<Option<f64>> = df.column("value").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values[0], Some(1.0));
        assert_eq!(values[6], None);
        assert_eq!(values[7], Some(8.0));
    }

    #[test]
    fn test_label_naming() {
        let df = decode_cube(CUBE, Naming::Label).unwrap();
        assert_eq!(column(&df, "region")[4], "Trondheim");
        assert_eq!(column(&df, "kjønn")[2], "Kvinner");
    }

    #[test]
    fn test_sparse_values_and_missing_index() {
        let body = r#"{
            "id": ["ContentsCode", "Tid"],
            "size": [1, 3],
            "dimension": {
                "ContentsCode": {"category": {"label": {"Personer1": "Personer"}}},
                "Tid": {"category": {"index": ["2019", "2020", "2021"]}}
            },
            "value": {"0": 10.5, "2": 12.0}
        }"#;
        let df = decode_cube(body, Naming::Id).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(column(&df, "ContentsCode"), vec!["Personer1"; 3]);
        let values: Vec<Option<f64>> = df.column("value").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(10.5), None, Some(12.0)]);
    }

    #[test]
    fn test_value_count_mismatch() {
        let body = r#"{
            "id": ["Tid"], "size": [2],
            "dimension": {"Tid": {"category": {"index": ["2020", "2021"]}}},
            "value": [1]
        }"#;
        assert!(matches!(decode_cube(body, Naming::Id), Err(SsbError::Decode(_))));
    }

    #[test]
    fn test_empty_cube() {
        let body = r#"{
            "id": ["Region", "Tid"], "size": [0, 1],
            "dimension": {
                "Region": {"category": {"index": {}}},
                "Tid": {"category": {"index": ["2021"]}}
            },
            "value": []
        }"#;
        let df = decode_cube(body, Naming::Id).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_not_a_cube() {
        let err = decode_cube(r#"{"error": "Too many values selected"}"#, Naming::Id).unwrap_err();
        assert!(matches!(err, SsbError::Decode(_)));
    }
}
