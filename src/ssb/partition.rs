//! Splitting one logical table request into API-sized sub-queries
//!
//! Tables with a region dimension are walked one period at a time, most recent
//! first. Within a period, regions are scanned in table order; regions that
//! were not valid in that year are left out, and the accumulated set is closed
//! into a sub-query before the next region would push it to the row ceiling.
//!
//! A `SubQuery` is an overlay on the descriptor (region and period indices),
//! not a copy of the metadata.

use super::error::{Result, SsbError};
use super::klass::ClassificationHistory;
use super::metadata::{DimensionRole, TableDescriptor};

/// Region codes for the whole country and similar aggregates
///
/// They are never checked against the classification history.
pub const RESERVED_REGION_CODES: [&str; 3] = ["0", "EAK", "EAKUO"];

pub fn is_reserved_region(code: &str) -> bool {
    RESERVED_REGION_CODES.contains(&code)
}

/// Year used for validity checks: leading four digits of the period code
///
/// `2021`, `2021K3` and `2021M07` all map to 2021.
pub fn period_year(period: &str) -> Option<i32> {
    let digits = period.get(..4)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// How values of one dimension are selected on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Explicit enumeration of value codes
    Item,
    /// The N most recent values
    Top,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Top => "top",
        }
    }
}

/// Time selection of a sub-query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSelection {
    /// Every period of the descriptor
    All,
    /// A single period, by index into the time dimension
    One(usize),
    /// The N most recent periods, selected by the API
    Top(usize),
}

/// Materialized selection for one dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionSelection<'a> {
    pub code: &'a str,
    pub filter: FilterMode,
    pub values: Vec<String>,
}

/// One bounded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    /// Position in planning order; results are concatenated in this order
    pub sequence: usize,
    /// Year targeted, used for region validity
    pub year: Option<i32>,
    pub period: PeriodSelection,
    /// Indices into the region dimension; `None` selects every region
    pub regions: Option<Vec<usize>>,
}

impl SubQuery {
    /// Rows this sub-query asks for
    pub fn row_count(&self, descriptor: &TableDescriptor) -> u64 {
        descriptor
            .dimensions()
            .iter()
            .enumerate()
            .map(|(idx, dim)| {
                if Some(idx) == descriptor.region_index() {
                    match &self.regions {
                        Some(regions) => regions.len() as u64,
                        None => dim.values.len() as u64,
                    }
                } else if Some(idx) == descriptor.time_index() {
                    match self.period {
                        PeriodSelection::All => dim.values.len() as u64,
                        PeriodSelection::One(_) => 1,
                        PeriodSelection::Top(n) => (n as u64).min(dim.values.len() as u64),
                    }
                } else {
                    dim.query_len()
                }
            })
            .product()
    }

    /// Region codes selected, in table order
    pub fn region_codes<'a>(&self, descriptor: &'a TableDescriptor) -> Vec<&'a str> {
        let Some(region) = descriptor.region_dimension() else {
            return Vec::new();
        };
        match &self.regions {
            Some(indices) => indices
                .iter()
                .map(|&idx| region.values[idx].as_str())
                .collect(),
            None => region.values.iter().map(String::as_str).collect(),
        }
    }

    /// Selection of every non-eliminated dimension, in descriptor order
    pub fn selections<'a>(&self, descriptor: &'a TableDescriptor) -> Vec<DimensionSelection<'a>> {
        descriptor
            .dimensions()
            .iter()
            .enumerate()
            .filter(|(_, dim)| !dim.eliminated)
            .map(|(idx, dim)| {
                let (filter, values) = if Some(idx) == descriptor.region_index() {
                    let codes = self.region_codes(descriptor);
                    (FilterMode::Item, codes.into_iter().map(str::to_string).collect())
                } else if Some(idx) == descriptor.time_index() {
                    match self.period {
                        PeriodSelection::All => (FilterMode::Item, dim.values.clone()),
                        PeriodSelection::One(p) => (FilterMode::Item, vec![dim.values[p].clone()]),
                        PeriodSelection::Top(n) => (FilterMode::Top, vec![n.to_string()]),
                    }
                } else if let Some(forced) = &dim.forced_value {
                    (FilterMode::Item, vec![forced.clone()])
                } else {
                    (FilterMode::Item, dim.values.clone())
                };

                DimensionSelection {
                    code: dim.code.as_str(),
                    filter,
                    values,
                }
            })
            .collect()
    }

    /// Short description for logs and failure reports
    pub fn label(&self, descriptor: &TableDescriptor) -> String {
        let period = match (self.period, descriptor.time_dimension()) {
            (PeriodSelection::One(p), Some(time)) => format!("period={}", time.values[p]),
            (PeriodSelection::Top(n), _) => format!("period=top{}", n),
            _ => "period=all".to_string(),
        };

        match &self.regions {
            Some(_) => {
                let codes = self.region_codes(descriptor);
                let first = codes.first().copied().unwrap_or("");
                let last = codes.last().copied().unwrap_or("");
                format!("{} regions={}..{} ({})", period, first, last, codes.len())
            }
            None => period,
        }
    }
}

/// Plans sub-queries for one descriptor against one validity history
pub struct QueryPartitioner<'a> {
    descriptor: &'a TableDescriptor,
    history: &'a ClassificationHistory,
    row_ceiling: u64,
    recent_periods: usize,
}

impl<'a> QueryPartitioner<'a> {
    /// `recent_periods` is used unless the descriptor's recipe overrides it
    pub fn new(
        descriptor: &'a TableDescriptor,
        history: &'a ClassificationHistory,
        row_ceiling: u64,
        recent_periods: usize,
    ) -> Self {
        Self {
            descriptor,
            history,
            row_ceiling,
            recent_periods: descriptor.periods().unwrap_or(recent_periods),
        }
    }

    /// Plan every sub-query, in the order results are concatenated
    pub fn partition(&self) -> Result<Vec<SubQuery>> {
        let planned = if self.descriptor.region_index().is_some() {
            self.partition_by_region()?
        } else {
            self.single_query()?
        };

        for sub in &planned {
            let rows = sub.row_count(self.descriptor);
            if rows >= self.row_ceiling {
                return Err(SsbError::QueryRejected {
                    label: sub.label(self.descriptor),
                    rows,
                    ceiling: self.row_ceiling,
                });
            }
        }

        tracing::info!(
            table = self.descriptor.table_id(),
            subqueries = planned.len(),
            row_ceiling = self.row_ceiling,
            "Partitioning complete"
        );
        Ok(planned)
    }

    fn single_query(&self) -> Result<Vec<SubQuery>> {
        let period = match (self.descriptor.time_index(), self.descriptor.periods()) {
            (Some(_), Some(n)) => PeriodSelection::Top(n),
            _ => PeriodSelection::All,
        };
        let sub = SubQuery {
            sequence: 0,
            year: None,
            period,
            regions: None,
        };

        let rows = sub.row_count(self.descriptor);
        if rows >= self.row_ceiling {
            return Err(SsbError::Unsupported(format!(
                "table {} has no region dimension and {} rows exceed the ceiling of {}",
                self.descriptor.table_id(),
                rows,
                self.row_ceiling
            )));
        }
        Ok(vec![sub])
    }

    /// Indices of the `recent_periods` latest periods, most recent first
    ///
    /// Recency comes from the period codes, not their position, so a filter
    /// listing periods out of order still selects the latest ones.
    fn periods(&self) -> Vec<Option<usize>> {
        match self.descriptor.time_dimension() {
            Some(time) => {
                let mut indices: Vec<usize> = (0..time.values.len()).collect();
                // Codes of one table share a format (2020, 2020K1, 2020M03)
                indices.sort_by(|&a, &b| time.values[b].cmp(&time.values[a]));
                indices
                    .into_iter()
                    .take(self.recent_periods)
                    .map(Some)
                    .collect()
            }
            None => vec![None],
        }
    }

    fn partition_by_region(&self) -> Result<Vec<SubQuery>> {
        let descriptor = self.descriptor;
        let slice = descriptor.slice_size();
        if slice >= self.row_ceiling {
            return Err(SsbError::Unsupported(format!(
                "table {}: one region and period is {} rows, ceiling is {}",
                descriptor.table_id(),
                slice,
                self.row_ceiling
            )));
        }

        let Some(region) = descriptor.region_dimension() else {
            return Ok(Vec::new());
        };
        debug_assert_eq!(region.role, DimensionRole::Region);

        let mut planned: Vec<SubQuery> = Vec::new();

        for period in self.periods() {
            let period_code = period
                .and_then(|p| descriptor.time_dimension().map(|t| t.values[p].as_str()));
            let year = period_code.and_then(period_year);
            let selection = period.map_or(PeriodSelection::All, PeriodSelection::One);

            if period_code.is_some() && year.is_none() {
                tracing::warn!(
                    period = period_code,
                    "Period has no year, region validity is not checked"
                );
            }

            let emit = |regions: Vec<usize>, planned: &mut Vec<SubQuery>| {
                planned.push(SubQuery {
                    sequence: planned.len(),
                    year,
                    period: selection,
                    regions: Some(regions),
                });
            };

            let mut current: Vec<usize> = Vec::new();
            for (idx, code) in region.values.iter().enumerate() {
                let eligible = is_reserved_region(code)
                    || year.map_or(true, |y| self.history.is_valid(code, y));
                if !eligible {
                    tracing::debug!(region = code.as_str(), ?year, "Region not valid, skipped");
                    continue;
                }

                if slice * (current.len() as u64 + 1) >= self.row_ceiling {
                    emit(std::mem::take(&mut current), &mut planned);
                }
                current.push(idx);
            }

            if current.is_empty() {
                tracing::debug!(
                    period = period_code,
                    "No valid regions for period, no sub-query planned"
                );
            } else {
                emit(current, &mut planned);
            }
        }

        Ok(planned)
    }
}
