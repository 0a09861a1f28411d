//! SSB statistics API module
//!
//! Structure:
//! - `client.rs`: HTTP client (table API, KLASS, publication search)
//! - `metadata.rs`, `filter.rs`, `recipe.rs`: table descriptor construction
//! - `klass.rs`: region validity history
//! - `partition.rs`: splitting a request under the row ceiling
//! - `query.rs`, `jsonstat.rs`, `assemble.rs`: request bodies, cube decoding, concatenation
//! - `settings.rs`: embedded defaults and environment overrides
//! - `error.rs`: Error types

pub mod assemble;
pub mod client;
pub mod error;
pub mod filter;
pub mod jsonstat;
pub mod klass;
pub mod metadata;
pub mod partition;
pub mod published;
pub mod query;
pub mod recipe;
pub mod settings;
pub mod throttle;

pub use assemble::{AssembledTable, ResultAssembler};
pub use client::SsbClient;
pub use error::{DroppedPartition, Result, SsbError};
pub use klass::{ClassificationHistory, ClassificationWindow, RegionValidity};
pub use metadata::{Dimension, DimensionRole, TableDescriptor};
pub use partition::{QueryPartitioner, SubQuery};
pub use published::TablePublication;
pub use recipe::{Recipe, RecipeBook};
