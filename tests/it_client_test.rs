//! Integration tests for the HTTP client: metadata, retries, publication lookup

mod common;

use common::*;
use mockito::{Matcher, Server};
use ssb_table_fetch::ssb::filter::FilterDiagnostic;
use ssb_table_fetch::ssb::{RecipeBook, SsbClient, SsbError, TableDescriptor};

#[tokio::test]
async fn fetch_descriptor_with_filter() {
    //* Given
    let mut server = Server::new_async().await;
    let metadata = mock_metadata(&mut server).await;
    let config = config(&server, &[]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let descriptor = TableDescriptor::fetch(&client, TABLE_ID, Some("Kjonn=2&Alder=999"), None)
        .await
        .expect("Failed to fetch descriptor");

    //* Then
    metadata.assert_async().await;
    assert_eq!(descriptor.dimension("Kjonn").unwrap().values, vec!["2"]);
    assert_eq!(descriptor.slice_size(), 1);
    assert_eq!(descriptor.region_dimension().unwrap().code, "Region");
    assert_eq!(descriptor.time_dimension().unwrap().code, "Tid");
    assert!(descriptor
        .diagnostics()
        .contains(&FilterDiagnostic::UnknownDimension("Alder".to_string())));
}

#[tokio::test]
async fn recipe_from_file_applies_to_descriptor() {
    //* Given
    let mut server = Server::new_async().await;
    let _metadata = mock_metadata(&mut server).await;
    let config = config(&server, &[]);
    let client = SsbClient::new(&config).unwrap();

    let mut recipes = RecipeBook::default();
    recipes.extend(
        RecipeBook::from_json(r#"{"tables": {"07459": {"eliminate": ["Kjonn"], "periods": 1}}}"#)
            .unwrap(),
    );

    //* When
    let descriptor = TableDescriptor::fetch(&client, TABLE_ID, None, recipes.get(TABLE_ID))
        .await
        .unwrap();

    //* Then
    assert!(descriptor.dimension("Kjonn").unwrap().eliminated);
    assert_eq!(descriptor.slice_size(), 1);
    assert_eq!(descriptor.periods(), Some(1));
}

#[tokio::test]
async fn missing_table_is_not_retried() {
    //* Given
    let mut server = Server::new_async().await;
    let missing = server
        .mock("GET", "/table/99999")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let config = config(&server, &[("request.attempts", "3")]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let result = client.table_metadata("99999").await;

    //* Then
    missing.assert_async().await;
    match result {
        Err(SsbError::MetadataFetch { table_id, reason }) => {
            assert_eq!(table_id, "99999");
            assert!(reason.contains("404"));
        }
        other => panic!("expected MetadataFetch, got {:?}", other.map(|m| m.title)),
    }
}

#[tokio::test]
async fn server_errors_are_retried_up_to_attempts() {
    //* Given
    let mut server = Server::new_async().await;
    let unavailable = server
        .mock("GET", "/table/07459")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;
    let config = config(&server, &[("request.attempts", "3")]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let result = client.table_metadata(TABLE_ID).await;

    //* Then
    unavailable.assert_async().await;
    assert!(matches!(result, Err(SsbError::MetadataFetch { .. })));
}

#[tokio::test]
async fn transient_server_error_recovers() {
    //* Given
    let mut server = Server::new_async().await;
    let unavailable = server
        .mock("GET", "/table/07459")
        .with_status(502)
        .expect(1)
        .create_async()
        .await;
    let ok = mock_metadata(&mut server).await;
    let config = config(&server, &[("request.attempts", "2")]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let metadata = client.table_metadata(TABLE_ID).await.expect("retry should succeed");

    //* Then
    unavailable.assert_async().await;
    ok.assert_async().await;
    assert_eq!(metadata.variables.len(), 4);
}

#[tokio::test]
async fn malformed_code_list_is_classification_error() {
    //* Given
    let mut server = Server::new_async().await;
    let _codes = mock_codes(&mut server, 200, r#"{"classificationItems": []}"#).await;
    let config = config(&server, &[]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let result = client.classification_codes("131", config.klass_window).await;

    //* Then
    assert!(matches!(
        result,
        Err(SsbError::ClassificationFetch { ref classification_id, .. }) if classification_id == "131"
    ));
}

#[tokio::test]
async fn published_lookup() {
    //* Given
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/table/")
        .match_query(Matcher::UrlEncoded(
            "query".to_string(),
            "title:07459".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": "07459", "path": "/be/be01/folkemengde/",
                 "title": "07459: Befolkning, etter region, kjønn, alder, statistikkvariabel og år",
                 "score": 14.3, "published": "2024-02-21T08:00:00"}
            ]"#,
        )
        .expect(1)
        .create_async()
        .await;
    let config = config(&server, &[]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let publication = client.published(TABLE_ID).await.expect("lookup failed");

    //* Then
    search.assert_async().await;
    let publication = publication.expect("table should be found");
    assert_eq!(publication.id, "07459");
    assert_eq!(publication.published.as_deref(), Some("2024-02-21T08:00:00"));
}

#[tokio::test]
async fn published_lookup_without_hits() {
    //* Given
    let mut server = Server::new_async().await;
    let _search = server
        .mock("GET", "/table/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let config = config(&server, &[]);
    let client = SsbClient::new(&config).unwrap();

    //* When
    let publication = client.published("00000").await.unwrap();

    //* Then
    assert!(publication.is_none());
}
