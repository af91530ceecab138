#![cfg(feature = "sync")]
//! Integration tests for the synchronous (`sync` feature) wrapper: a
//! blocking roundtrip against a mocked server driven from a plain `#[test]`
//! rather than `#[tokio::test]`.

use chromium_rs::{Record, SyncClient};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{collection_path, collections_path, mount_preflight, test_config, ConstantEmbedding};

#[test]
fn sync_collection_dml_roundtrip() {
    // SyncClient owns its own tokio runtime, so the mock server (itself
    // async) is stood up on a throwaway runtime just for setup.
    let setup_rt = tokio::runtime::Runtime::new().unwrap();
    let server = setup_rt.block_on(async {
        let server = MockServer::start().await;
        mount_preflight(&server).await;
        Mock::given(method("POST"))
            .and(path(collections_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "col-1", "name": "docs", "metadata": {},
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(collection_path("col-1", "add")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(collection_path("col-1", "count")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(2)))
            .mount(&server)
            .await;
        server
    });

    let client = SyncClient::from_config(test_config(&server)).unwrap();
    let coll = client
        .create_collection(
            "docs",
            None,
            None,
            Some(ConstantEmbedding { value: 1.0, dim: 3 }),
        )
        .unwrap();

    coll.add(vec![
        Record::new("sid1").with_document("sdoc1"),
        Record::new("sid2").with_document("sdoc2"),
    ])
    .unwrap();

    assert_eq!(coll.count().unwrap(), 2);

    client.close();
}
