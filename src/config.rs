//! Run configuration
//!
//! Defaults come from defaults.json via `SettingReader`; `SSB_*` environment
//! variables and command line flags override them.

use crate::ssb::settings::SettingReader;
use crate::ssb::ClassificationWindow;
use std::path::PathBuf;
use std::time::Duration;

/// What the assembler does when a partition request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the whole run on the first failed partition
    #[default]
    Abort,
    /// Drop the failed partition, keep going, and report it
    Skip,
}

impl FailurePolicy {
    /// Parse from string value
    ///
    /// Validation happens in SettingReader::get_enum()
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "skip" => Self::Skip,
            _ => Self::Abort,
        }
    }
}

/// Whether decoded columns carry category codes or display labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Naming {
    #[default]
    Id,
    Label,
}

impl Naming {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "label" => Self::Label,
            _ => Self::Id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Table API base, e.g. `https://data.ssb.no/api/v0/no`
    pub api_base: String,

    /// Classification service base, e.g. `https://data.ssb.no/api/klass/v1`
    pub klass_base: String,

    /// Maximum rows per request; the API rejects anything larger
    pub row_ceiling: u64,

    /// Most recent periods fetched for tables with a region dimension
    pub recent_periods: usize,

    /// Region classifications merged into the validity history
    pub classifications: Vec<String>,

    /// Requested validity window for the classification service
    pub klass_window: ClassificationWindow,

    /// Minimum interval between two requests
    pub request_interval: Duration,

    /// Timeout of one HTTP request
    pub request_timeout: Duration,

    /// Attempts per request (transport errors and 5xx only)
    pub request_attempts: u32,

    /// First delay between attempts, doubled on each retry
    pub request_backoff: Duration,

    pub failure_policy: FailurePolicy,

    /// Extra runs when the assembled table comes back empty
    pub empty_result_retries: u32,

    /// Concurrent cube decodes
    pub decode_workers: usize,

    pub naming: Naming,

    /// User recipe file layered over the built-in recipes
    pub recipe_file: Option<PathBuf>,
}

impl FetchConfig {
    /// Create config from settings
    pub fn from_settings(settings: &SettingReader) -> Self {
        let lookback = settings.get_u64("klass.lookback.years") as i32;
        let ceiling_year = settings.get_u64("klass.ceiling.year") as i32;

        // 0 = one worker per available core
        let decode_workers = match settings.get_u64("decode.workers") as usize {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };

        Self {
            api_base: trim_base(settings.get_string("api.base")),
            klass_base: trim_base(settings.get_string("klass.base")),
            row_ceiling: settings.get_u64("row.ceiling"),
            recent_periods: settings.get_u64("periods") as usize,
            classifications: settings.get_list("classifications"),
            klass_window: ClassificationWindow::looking_back(lookback, ceiling_year),
            request_interval: Duration::from_millis(settings.get_u64("request.interval.ms")),
            request_timeout: Duration::from_millis(settings.get_u64("request.timeout.ms")),
            request_attempts: (settings.get_u64("request.attempts") as u32).max(1),
            request_backoff: Duration::from_millis(settings.get_u64("request.backoff.ms")),
            failure_policy: FailurePolicy::parse(&settings.get_enum("failure.policy")),
            empty_result_retries: settings.get_u64("empty.retries") as u32,
            decode_workers,
            naming: Naming::parse(&settings.get_enum("naming")),
            recipe_file: settings.get_optional_string("recipes.file").map(PathBuf::from),
        }
    }

    /// Defaults overlaid with `SSB_*` environment variables
    pub fn from_env() -> Self {
        Self::from_settings(&SettingReader::from_env())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_settings(&SettingReader::defaults())
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FetchConfig::default();
        assert_eq!(config.api_base, "https://data.ssb.no/api/v0/no");
        assert_eq!(config.row_ceiling, 800_000);
        assert_eq!(config.recent_periods, 5);
        assert_eq!(config.request_interval, Duration::from_secs(5));
        assert_eq!(config.request_attempts, 3);
        assert_eq!(config.request_backoff, Duration::from_secs(1));
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.empty_result_retries, 10);
        assert_eq!(config.naming, Naming::Id);
        assert_eq!(config.klass_window.to_year, 2059);
        assert!(config.decode_workers >= 1);
        assert!(config.recipe_file.is_none());
    }

    #[test]
    fn test_config_from_overrides() {
        let settings = SettingReader::from_pairs([
            ("api.base", "http://localhost:1234/api/v0/en/"),
            ("failure.policy", "skip"),
            ("decode.workers", "2"),
            ("request.attempts", "0"),
            ("naming", "label"),
        ]);
        let config = FetchConfig::from_settings(&settings);
        assert_eq!(config.api_base, "http://localhost:1234/api/v0/en");
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.decode_workers, 2);
        assert_eq!(config.request_attempts, 1);
        assert_eq!(config.naming, Naming::Label);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(FailurePolicy::parse("Skip"), FailurePolicy::Skip);
        assert_eq!(FailurePolicy::parse("abort"), FailurePolicy::Abort);
        assert_eq!(FailurePolicy::parse("whatever"), FailurePolicy::Abort);
    }
}
