//! Fixtures shared by the integration tests
#![allow(dead_code)]

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use ssb_table_fetch::config::FetchConfig;
use ssb_table_fetch::ssb::settings::SettingReader;

pub const TABLE_ID: &str = "07459";

/// Region x sex x contents x year; 1601 and 5001 never coexist in one year
pub const METADATA: &str = r#"{
    "title": "07459: Befolkning, etter region, kjønn, statistikkvariabel og år",
    "variables": [
        {"code": "Region", "text": "region",
         "values": ["0", "0301", "1601", "5001"],
         "valueTexts": ["Hele landet", "Oslo", "Trondheim (-2019)", "Trondheim"],
         "elimination": true},
        {"code": "Kjonn", "text": "kjønn",
         "values": ["1", "2"], "valueTexts": ["Menn", "Kvinner"], "elimination": true},
        {"code": "ContentsCode", "text": "statistikkvariabel",
         "values": ["Personer1"], "valueTexts": ["Personer"]},
        {"code": "Tid", "text": "år",
         "values": ["2018", "2019", "2020"], "valueTexts": ["2018", "2019", "2020"], "time": true}
    ]
}"#;

pub const CODES_131: &str = r#"{
    "codes": [
        {"code": "0301", "name": "Oslo",
         "validFromInRequestedRange": "2015-01-01", "validToInRequestedRange": null},
        {"code": "1601", "name": "Trondheim",
         "validFromInRequestedRange": "2015-01-01", "validToInRequestedRange": "2020-01-01"},
        {"code": "5001", "name": "Trondheim",
         "validFromInRequestedRange": "2020-01-01"}
    ]
}"#;

/// Config pointed at the mock server: no throttle, one attempt, two periods
pub fn config(server: &ServerGuard, overrides: &[(&str, &str)]) -> FetchConfig {
    let base = server.url();
    let settings = SettingReader::from_pairs([
        ("api.base".to_string(), base.clone()),
        ("klass.base".to_string(), format!("{}/klass", base)),
        ("classifications".to_string(), "131".to_string()),
        ("request.interval.ms".to_string(), "0".to_string()),
        ("request.attempts".to_string(), "1".to_string()),
        ("request.backoff.ms".to_string(), "10".to_string()),
        ("empty.retries".to_string(), "0".to_string()),
        ("periods".to_string(), "2".to_string()),
        ("decode.workers".to_string(), "2".to_string()),
    ])
    .with_overrides(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    FetchConfig::from_settings(&settings)
}

pub async fn mock_metadata(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", format!("/table/{}", TABLE_ID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(METADATA)
        .create_async()
        .await
}

pub async fn mock_codes(server: &mut ServerGuard, status: usize, body: &str) -> Mock {
    server
        .mock(
            "GET",
            Matcher::Regex(r"^/klass/classifications/131/codes".to_string()),
        )
        .match_query(Matcher::Any)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// Body matcher for the sub-query selecting `regions` in `period`
pub fn query_matcher(regions: &[&str], period: &str) -> Matcher {
    let codes = regions
        .iter()
        .map(|r| format!("\"{}\"", r))
        .collect::<Vec<_>>()
        .join(",");
    Matcher::AllOf(vec![
        Matcher::Regex(format!(
            r#""code":"Region","selection":\{{"filter":"item","values":\[{}\]\}}"#,
            codes
        )),
        Matcher::Regex(format!(
            r#""code":"Tid","selection":\{{"filter":"item","values":\["{}"\]\}}"#,
            period
        )),
    ])
}

/// Cube answering a query for `regions` in `period`, two rows per region
pub fn cube(regions: &[&str], period: &str) -> String {
    let region_index: serde_json::Map<String, serde_json::Value> = regions
        .iter()
        .enumerate()
        .map(|(i, r)| (r.to_string(), json!(i)))
        .collect();
    let values: Vec<f64> = (0..regions.len() * 2).map(|i| i as f64).collect();

    json!({
        "version": "2.0",
        "class": "dataset",
        "id": ["Region", "Kjonn", "ContentsCode", "Tid"],
        "size": [regions.len(), 2, 1, 1],
        "dimension": {
            "Region": {"label": "region", "category": {"index": region_index}},
            "Kjonn": {"label": "kjønn", "category": {"index": ["1", "2"]}},
            "ContentsCode": {"label": "statistikkvariabel", "category": {"index": ["Personer1"]}},
            "Tid": {"label": "år", "category": {"index": [period]}}
        },
        "value": values
    })
    .to_string()
}

pub async fn mock_query(
    server: &mut ServerGuard,
    regions: &[&str],
    period: &str,
    status: usize,
) -> Mock {
    let body = if status == 200 {
        cube(regions, period)
    } else {
        String::new()
    };
    server
        .mock("POST", format!("/table/{}", TABLE_ID).as_str())
        .match_body(query_matcher(regions, period))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// A 200 answer to the sub-query whose body is not a cube
pub async fn mock_garbled_query(server: &mut ServerGuard, regions: &[&str], period: &str) -> Mock {
    server
        .mock("POST", format!("/table/{}", TABLE_ID).as_str())
        .match_body(query_matcher(regions, period))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>Service busy</body></html>")
        .create_async()
        .await
}

pub fn strings(df: &polars::prelude::DataFrame, column: &str) -> Vec<String> {
    df.column(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect()
}
