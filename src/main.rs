//! ssb-fetch - Main entry point
//!
//! Fetches a table from the SSB statistics API, splitting the request under
//! the API's row ceiling and skipping regions that did not exist in a year.
//!
//! Subcommands:
//! - `fetch`: plan, fetch and concatenate a table
//! - `plan`: show the sub-queries a fetch would issue
//! - `published`: latest publication timestamp of tables
//! - `settings`: list settings, their environment variables and defaults

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ssb_table_fetch::config::FetchConfig;
use ssb_table_fetch::pipeline;
use ssb_table_fetch::ssb::settings::{env_var_name, registry, SettingReader};
use ssb_table_fetch::ssb::{RecipeBook, SsbClient};
use std::io::IsTerminal;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ssb-fetch", version, about)]
struct Cli {
    #[command(flatten)]
    settings: SettingArgs,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for defaults.json; `SSB_*` environment variables sit in between
#[derive(Args, Debug, Default)]
struct SettingArgs {
    /// Table API base URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Classification service base URL
    #[arg(long, global = true)]
    klass_base: Option<String>,

    /// Maximum rows per request
    #[arg(long, global = true)]
    row_ceiling: Option<u64>,

    /// Most recent periods to fetch
    #[arg(long, global = true)]
    periods: Option<u64>,

    /// Region classification ids, comma separated
    #[arg(long, global = true)]
    classifications: Option<String>,

    /// Minimum milliseconds between two requests
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// What to do when a partition fails: abort or skip
    #[arg(long, global = true)]
    on_failure: Option<String>,

    /// Column naming: id or label
    #[arg(long, global = true)]
    naming: Option<String>,

    /// Recipe file layered over the built-in recipes
    #[arg(long, global = true)]
    recipes: Option<String>,

    /// Any setting, as name=value (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE", global = true)]
    set: Vec<String>,
}

impl SettingArgs {
    fn pairs(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = [
            ("api.base", self.api_base.clone()),
            ("klass.base", self.klass_base.clone()),
            ("row.ceiling", self.row_ceiling.map(|v| v.to_string())),
            ("periods", self.periods.map(|v| v.to_string())),
            ("classifications", self.classifications.clone()),
            ("request.interval.ms", self.interval_ms.map(|v| v.to_string())),
            ("failure.policy", self.on_failure.clone()),
            ("naming", self.naming.clone()),
            ("recipes.file", self.recipes.clone()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect();

        for entry in &self.set {
            let (name, value) = entry
                .split_once('=')
                .with_context(|| format!("--set expects NAME=VALUE, got '{}'", entry))?;
            let name = name.trim();
            if registry().get_setting(name).is_none() {
                anyhow::bail!("Unknown setting '{}'", name);
            }
            pairs.push((name.to_string(), value.trim().to_string()));
        }

        Ok(pairs)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a table and print the assembled result
    Fetch {
        table_id: String,

        /// Filter expression, e.g. `ContentsCode=Personer1&Kjonn=1,2`
        #[arg(long, short)]
        filter: Option<String>,

        /// Also print the code-to-text table of every dimension
        #[arg(long)]
        labels: bool,

        /// Rows of the result to print
        #[arg(long, default_value = "10")]
        show: usize,
    },

    /// Show the sub-queries a fetch would issue
    Plan {
        table_id: String,

        #[arg(long, short)]
        filter: Option<String>,
    },

    /// Print the latest publication timestamp of one or more tables
    Published {
        #[arg(required = true)]
        table_ids: Vec<String>,
    },

    /// List settings with their environment variables and defaults
    Settings,
}

fn register_logger() {
    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    register_logger();

    let settings = SettingReader::from_env().with_overrides(cli.settings.pairs()?);
    let config = FetchConfig::from_settings(&settings);

    if let Command::Settings = cli.command {
        print_settings();
        return Ok(());
    }

    let client = SsbClient::new(&config).context("Failed to create SSB client")?;
    let recipes = RecipeBook::builtin_with(config.recipe_file.as_deref())
        .context("Failed to load recipes")?;

    match cli.command {
        Command::Fetch {
            table_id,
            filter,
            labels,
            show,
        } => {
            let outcome =
                pipeline::fetch_table(&client, &config, &recipes, &table_id, filter.as_deref())
                    .await
                    .with_context(|| format!("Failed to fetch table {}", table_id))?;

            let table = &outcome.table;
            println!(
                "Table {} ({}): {} rows x {} columns from {} sub-queries",
                table_id,
                outcome.descriptor.title(),
                table.frame.height(),
                table.frame.width(),
                table.requested
            );
            if outcome.runs > 1 {
                println!("Fetched {} times before a non-empty result", outcome.runs);
            }
            if !table.is_complete() {
                println!("Dropped partitions:");
                for partition in &table.dropped {
                    println!("  {}", partition);
                }
            }
            println!("{}", table.frame.head(Some(show)));

            if labels {
                for frame in outcome.descriptor.label_frames()? {
                    println!("{}", frame);
                }
            }
        }
        Command::Plan { table_id, filter } => {
            let plan =
                pipeline::plan_table(&client, &config, &recipes, &table_id, filter.as_deref())
                    .await
                    .with_context(|| format!("Failed to plan table {}", table_id))?;

            for diagnostic in plan.descriptor.diagnostics() {
                println!("filter: {}", diagnostic);
            }
            println!(
                "Table {}: slice {} rows, total {} rows, ceiling {}",
                table_id,
                plan.descriptor.slice_size(),
                plan.descriptor.total_size(),
                config.row_ceiling
            );
            for sub in &plan.subqueries {
                println!(
                    "  #{:<4} {:>9} rows  {}",
                    sub.sequence,
                    sub.row_count(&plan.descriptor),
                    sub.label(&plan.descriptor)
                );
            }
            println!("{} sub-queries", plan.subqueries.len());
        }
        Command::Published { table_ids } => {
            for table_id in &table_ids {
                let publication = client
                    .published(table_id)
                    .await
                    .with_context(|| format!("Failed to look up table {}", table_id))?;
                match publication.and_then(|p| p.published) {
                    Some(published) => println!("{}\t{}", table_id, published),
                    None => println!("{}\t-", table_id),
                }
            }
        }
        Command::Settings => {}
    }

    Ok(())
}

fn print_settings() {
    for def in registry().settings() {
        println!(
            "{:<22} {:<28} {:<32} {}",
            def.name,
            env_var_name(&def.name),
            def.default_value,
            def.description
        );
    }
}
