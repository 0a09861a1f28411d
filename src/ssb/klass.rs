//! Region validity history from the KLASS classification service
//!
//! Every code list item carries a validity range inside the requested window.
//! Ranges are truncated to calendar years (inclusive from, exclusive to) and
//! merged per code across all classifications, so that a region code can be
//! checked against the year a sub-query targets.

use super::client::SsbClient;
use super::error::{Result, SsbError};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::collections::HashMap;

/// Code list response of `/classifications/{id}/codes`
#[derive(Debug, Clone, Deserialize)]
pub struct CodeList {
    pub codes: Vec<ClassificationCode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationCode {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub valid_from_in_requested_range: Option<String>,
    #[serde(default)]
    pub valid_to_in_requested_range: Option<String>,
}

/// Years requested from the classification service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationWindow {
    pub from_year: i32,
    pub to_year: i32,
}

impl ClassificationWindow {
    /// Window from `lookback` years before the current year up to `ceiling_year`
    pub fn looking_back(lookback: i32, ceiling_year: i32) -> Self {
        let current = chrono::Local::now().year();
        Self {
            from_year: current - lookback,
            to_year: ceiling_year,
        }
    }

    /// Query string for the codes endpoint
    pub fn query_string(&self) -> String {
        format!(
            "from={}-01-01&to={}-01-01&includeFuture=true",
            self.from_year, self.to_year
        )
    }
}

/// Merged validity of one region code: `[valid_from, valid_to)` in years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionValidity {
    pub valid_from: i32,
    pub valid_to: i32,
}

impl RegionValidity {
    /// A reversed range collapses to an empty one at `valid_from`
    pub fn new(valid_from: i32, valid_to: i32) -> Self {
        Self {
            valid_from,
            valid_to: valid_to.max(valid_from),
        }
    }

    /// Widen to cover another observation of the same code
    pub fn widen(&mut self, other: RegionValidity) {
        self.valid_from = self.valid_from.min(other.valid_from);
        self.valid_to = self.valid_to.max(other.valid_to);
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.valid_from..self.valid_to).contains(&year)
    }
}

/// Merged region validity across one or more classifications
#[derive(Debug, Clone, Default)]
pub struct ClassificationHistory {
    records: HashMap<String, RegionValidity>,
}

impl ClassificationHistory {
    /// Fetch every classification and merge their code lists
    ///
    /// Any failing classification aborts construction; there is no partial history.
    pub async fn fetch(
        client: &SsbClient,
        classification_ids: &[String],
        window: ClassificationWindow,
    ) -> Result<Self> {
        let mut history = Self::default();

        for id in classification_ids {
            let list = client.classification_codes(id, window).await?;
            tracing::debug!(
                classification = id.as_str(),
                codes = list.codes.len(),
                "Fetched classification"
            );
            history.merge_code_list(id, &list, window)?;
        }

        tracing::info!(
            classifications = classification_ids.len(),
            regions = history.len(),
            "Region validity history built"
        );
        Ok(history)
    }

    /// Merge one code list; `classification_id` only names the source in errors
    pub fn merge_code_list(
        &mut self,
        classification_id: &str,
        list: &CodeList,
        window: ClassificationWindow,
    ) -> Result<()> {
        for item in &list.codes {
            let valid_from = match item.valid_from_in_requested_range.as_deref() {
                Some(date) => year_of(classification_id, &item.code, date)?,
                None => window.from_year,
            };
            let valid_to = match item.valid_to_in_requested_range.as_deref() {
                Some(date) => year_of(classification_id, &item.code, date)?,
                None => window.to_year,
            };
            self.observe(&item.code, RegionValidity::new(valid_from, valid_to));
        }
        Ok(())
    }

    /// Record one observation of a code, widening any earlier record
    pub fn observe(&mut self, code: &str, validity: RegionValidity) {
        self.records
            .entry(code.to_string())
            .and_modify(|existing| existing.widen(validity))
            .or_insert(validity);
    }

    /// True if the code has no record or `year` lies within its merged range
    pub fn is_valid(&self, code: &str, year: i32) -> bool {
        self.records
            .get(code)
            .map(|validity| validity.contains(year))
            .unwrap_or(true)
    }

    pub fn record(&self, code: &str) -> Option<&RegionValidity> {
        self.records.get(code)
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &RegionValidity)> {
        self.records.iter().map(|(code, v)| (code.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn year_of(classification_id: &str, code: &str, date: &str) -> Result<i32> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.year())
        .map_err(|e| SsbError::ClassificationFetch {
            classification_id: classification_id.to_string(),
            reason: format!("code {} has invalid date '{}': {}", code, date, e),
        })
}
