//! Shared fetch pipeline
//!
//! Used by every subcommand of the binary and by the integration tests.
//!
//! The pipeline:
//! 1. Builds the TableDescriptor (metadata + recipe + filter)
//! 2. Builds the ClassificationHistory when the table has region and time dimensions
//! 3. Plans sub-queries under the row ceiling
//! 4. Assembles the result, re-running while it comes back empty

use crate::config::FetchConfig;
use crate::ssb::{
    AssembledTable, ClassificationHistory, QueryPartitioner, RecipeBook, Result, ResultAssembler,
    SsbClient, SubQuery, TableDescriptor,
};

/// A planned but not yet issued table fetch
#[derive(Debug)]
pub struct FetchPlan {
    pub descriptor: TableDescriptor,
    pub history: ClassificationHistory,
    pub subqueries: Vec<SubQuery>,
}

/// Result of a full fetch
#[derive(Debug)]
pub struct RunOutcome {
    pub descriptor: TableDescriptor,
    pub table: AssembledTable,
    /// Assembly runs made, 1 unless empty results were retried
    pub runs: u32,
}

/// Steps 1 to 3: descriptor, history and sub-queries, without fetching data
pub async fn plan_table(
    client: &SsbClient,
    config: &FetchConfig,
    recipes: &RecipeBook,
    table_id: &str,
    filter: Option<&str>,
) -> Result<FetchPlan> {
    tracing::info!(table = table_id, "[1/3] Fetching table metadata");
    let recipe = recipes.get(table_id);
    if recipe.is_some() {
        tracing::info!(table = table_id, "Applying table recipe");
    }
    let descriptor = TableDescriptor::fetch(client, table_id, filter, recipe).await?;

    // Validity only matters when regions are queried per year
    let history = if descriptor.region_index().is_some() && descriptor.time_index().is_some() {
        tracing::info!(
            classifications = ?config.classifications,
            "[2/3] Building region validity history"
        );
        ClassificationHistory::fetch(client, &config.classifications, config.klass_window).await?
    } else {
        tracing::info!("[2/3] No region validity needed");
        ClassificationHistory::default()
    };

    tracing::info!(row_ceiling = config.row_ceiling, "[3/3] Planning sub-queries");
    let subqueries = QueryPartitioner::new(
        &descriptor,
        &history,
        config.row_ceiling,
        config.recent_periods,
    )
    .partition()?;

    Ok(FetchPlan {
        descriptor,
        history,
        subqueries,
    })
}

/// Plan and assemble one table
///
/// An assembled table with no rows is fetched again, up to
/// `config.empty_result_retries` extra times. A plan with no sub-queries is
/// returned empty without retrying.
pub async fn fetch_table(
    client: &SsbClient,
    config: &FetchConfig,
    recipes: &RecipeBook,
    table_id: &str,
    filter: Option<&str>,
) -> Result<RunOutcome> {
    let plan = plan_table(client, config, recipes, table_id, filter).await?;
    let assembler = ResultAssembler::new(client, &plan.descriptor, config);

    let max_runs = config.empty_result_retries.saturating_add(1);
    let mut runs = 0;
    let table = loop {
        runs += 1;
        let table = assembler.assemble(&plan.subqueries).await?;

        if table.frame.height() > 0 || plan.subqueries.is_empty() || runs >= max_runs {
            break table;
        }
        tracing::warn!(
            table = table_id,
            run = runs,
            max_runs,
            "Assembled table is empty, fetching again"
        );
    };

    if table.frame.height() == 0 && !plan.subqueries.is_empty() {
        tracing::warn!(table = table_id, runs, "Table still empty after retries");
    }

    Ok(RunOutcome {
        descriptor: plan.descriptor,
        table,
        runs,
    })
}
