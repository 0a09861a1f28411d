//! SSB table fetch library
//!
//! Fetches statistics tables from the SSB PxWeb API, partitioning requests
//! under the API's row ceiling and reconciling region codes against their
//! classification history. Used by the `ssb-fetch` binary and the tests.

pub mod config;
pub mod pipeline;
pub mod ssb;
