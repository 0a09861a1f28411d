//! Issue planned sub-queries and concatenate the decoded results
//!
//! Fetching is sequential (the client gates every request). Each body is
//! handed to the blocking pool for decode as soon as it arrives, with at most
//! `decode_workers` decodes in flight, so decoding overlaps the wait before
//! the next request. Frames are re-sorted by sequence before they are stacked.

use super::client::SsbClient;
use super::error::{DroppedPartition, Result, SsbError};
use super::jsonstat::decode_cube;
use super::metadata::TableDescriptor;
use super::partition::SubQuery;
use super::query::TableQuery;
use crate::config::{FailurePolicy, FetchConfig, Naming};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::future::Future;
use polars::prelude::*;

/// Concatenated result of one assembly run
#[derive(Debug, Clone)]
pub struct AssembledTable {
    /// All decoded rows, in sub-query order
    pub frame: DataFrame,
    /// Partitions left out under the skip policy
    pub dropped: Vec<DroppedPartition>,
    /// Number of sub-queries issued
    pub requested: usize,
}

impl AssembledTable {
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Outcome of one decode task
struct Decoded {
    sequence: usize,
    label: String,
    outcome: Result<DataFrame>,
}

/// Frames and dropped partitions collected so far
#[derive(Default)]
struct Collected {
    frames: Vec<(usize, DataFrame)>,
    dropped: Vec<DroppedPartition>,
}

pub struct ResultAssembler<'a> {
    client: &'a SsbClient,
    descriptor: &'a TableDescriptor,
    row_ceiling: u64,
    policy: FailurePolicy,
    naming: Naming,
    decode_workers: usize,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(client: &'a SsbClient, descriptor: &'a TableDescriptor, config: &FetchConfig) -> Self {
        Self {
            client,
            descriptor,
            row_ceiling: config.row_ceiling,
            policy: config.failure_policy,
            naming: config.naming,
            decode_workers: config.decode_workers.max(1),
        }
    }

    /// Fetch, decode and concatenate every sub-query
    ///
    /// Under the abort policy the first failed request or decode ends the
    /// run; decodes that already finished are checked before every request.
    pub async fn assemble(&self, subqueries: &[SubQuery]) -> Result<AssembledTable> {
        let total = subqueries.len();
        let mut collected = Collected::default();
        let mut in_flight = FuturesUnordered::new();

        for (i, sub) in subqueries.iter().enumerate() {
            while let Some(Some(done)) = in_flight.next().now_or_never() {
                self.settle(done, &mut collected)?;
            }

            let label = sub.label(self.descriptor);

            // Never send a request the API is known to reject
            let rows = sub.row_count(self.descriptor);
            if rows >= self.row_ceiling {
                return Err(SsbError::QueryRejected {
                    label,
                    rows,
                    ceiling: self.row_ceiling,
                });
            }

            let query = TableQuery::for_subquery(self.descriptor, sub);
            match self.client.post_query(self.descriptor.table_id(), &query).await {
                Ok(body) => {
                    tracing::info!(
                        table = self.descriptor.table_id(),
                        subquery = i + 1,
                        total,
                        rows,
                        label = label.as_str(),
                        "Fetched sub-query"
                    );

                    if in_flight.len() >= self.decode_workers {
                        if let Some(done) = in_flight.next().await {
                            self.settle(done, &mut collected)?;
                        }
                    }
                    in_flight.push(self.spawn_decode(sub.sequence, label, body));
                }
                Err(e) => {
                    let partition = DroppedPartition {
                        sequence: sub.sequence,
                        label,
                        reason: e.to_string(),
                    };
                    self.record_failure(partition, &mut collected.dropped)?;
                }
            }
        }

        while let Some(done) = in_flight.next().await {
            self.settle(done, &mut collected)?;
        }

        let Collected {
            mut frames,
            mut dropped,
        } = collected;
        frames.sort_by_key(|(sequence, _)| *sequence);
        dropped.sort_by_key(|d| d.sequence);

        let frame = concat_frames(frames.into_iter().map(|(_, frame)| frame).collect())?;

        for partition in &dropped {
            tracing::warn!(partition = %partition, "Partition dropped");
        }

        tracing::info!(
            table = self.descriptor.table_id(),
            rows = frame.height(),
            subqueries = total,
            dropped = dropped.len(),
            "Table assembled"
        );

        Ok(AssembledTable {
            frame,
            dropped,
            requested: total,
        })
    }

    /// Start decoding one body on the blocking pool
    fn spawn_decode(
        &self,
        sequence: usize,
        label: String,
        body: String,
    ) -> impl Future<Output = Decoded> {
        let naming = self.naming;
        let task = tokio::task::spawn_blocking(move || decode_cube(&body, naming));
        async move {
            let outcome = task
                .await
                .map_err(|e| SsbError::Other(format!("decode task failed: {}", e)))
                .and_then(|decoded| decoded);
            Decoded {
                sequence,
                label,
                outcome,
            }
        }
    }

    fn settle(&self, decoded: Decoded, collected: &mut Collected) -> Result<()> {
        let Decoded {
            sequence,
            label,
            outcome,
        } = decoded;
        match outcome {
            Ok(frame) => {
                collected.frames.push((sequence, frame));
                Ok(())
            }
            Err(e) => {
                tracing::debug!(sequence, error = %e, "Decode failed");
                let partition = DroppedPartition {
                    sequence,
                    label,
                    reason: e.to_string(),
                };
                self.record_failure(partition, &mut collected.dropped)
            }
        }
    }

    fn record_failure(
        &self,
        partition: DroppedPartition,
        dropped: &mut Vec<DroppedPartition>,
    ) -> Result<()> {
        match self.policy {
            FailurePolicy::Abort => Err(SsbError::PartialResult {
                failed: vec![partition],
            }),
            FailurePolicy::Skip => {
                dropped.push(partition);
                Ok(())
            }
        }
    }
}

/// Stack frames vertically, keeping their order
pub fn concat_frames(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut frames = frames.into_iter();
    let Some(mut result) = frames.next() else {
        return Ok(DataFrame::empty());
    };
    for frame in frames {
        result.vstack_mut(&frame)?;
    }
    Ok(result)
}
