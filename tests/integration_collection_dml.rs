//! Integration tests for collection DML: add/upsert/update/delete semantics
//! and the record-set validation they go through, against a mocked server.

use chromium_rs::{Client, GetParams, Record};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{collection_path, collections_path, mount_preflight, test_config, ConstantEmbedding, DummyEmbedding};

async fn collection_with_embedder(server: &MockServer) -> chromium_rs::Collection<ConstantEmbedding> {
    mount_preflight(server).await;
    Mock::given(method("POST"))
        .and(path(collections_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "col-1", "name": "docs", "metadata": {},
        })))
        .mount(server)
        .await;

    let client = Client::new(test_config(server)).unwrap();
    client
        .create_collection("docs", None, None, Some(ConstantEmbedding { value: 0.5, dim: 3 }))
        .await
        .unwrap()
}

async fn collection_without_embedder(server: &MockServer) -> chromium_rs::Collection<DummyEmbedding> {
    mount_preflight(server).await;
    Mock::given(method("POST"))
        .and(path(collections_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "col-1", "name": "docs", "metadata": {},
        })))
        .mount(server)
        .await;

    let client = Client::new(test_config(server)).unwrap();
    client.create_collection("docs", None, None, None::<DummyEmbedding>).await.unwrap()
}

#[tokio::test]
async fn add_fills_missing_embeddings_from_bound_embedder() {
    let server = MockServer::start().await;
    let coll = collection_with_embedder(&server).await;

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "add")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    coll.add(vec![
        Record::new("a").with_document("hello"),
        Record::new("b").with_document("world"),
    ])
    .await
    .unwrap();
}

#[tokio::test]
async fn add_without_embedder_requires_explicit_embeddings() {
    let server = MockServer::start().await;
    let coll = collection_without_embedder(&server).await;

    let err = coll
        .add(vec![Record::new("a").with_document("hello")])
        .await
        .unwrap_err();
    assert!(matches!(err, chromium_rs::ChromiumError::Client(_)));
}

#[tokio::test]
async fn add_rejects_duplicate_ids_within_one_call() {
    let server = MockServer::start().await;
    let coll = collection_with_embedder(&server).await;

    let err = coll
        .add(vec![
            Record::new("dup").with_document("one"),
            Record::new("dup").with_document("two"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, chromium_rs::ChromiumError::Client(_)));
}

#[tokio::test]
async fn add_rejects_record_with_no_content() {
    let server = MockServer::start().await;
    let coll = collection_with_embedder(&server).await;

    let err = coll.add(vec![Record::new("bare")]).await.unwrap_err();
    assert!(matches!(err, chromium_rs::ChromiumError::ValidationFailure(_)));
}

#[tokio::test]
async fn upsert_goes_through_the_same_build_pipeline_as_add() {
    let server = MockServer::start().await;
    let coll = collection_with_embedder(&server).await;

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "upsert")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    coll.upsert(vec![Record::new("a").with_document("hello")])
        .await
        .unwrap();
}

#[tokio::test]
async fn upsert_then_get_returns_merged_ids_and_documents() {
    let server = MockServer::start().await;
    let coll = collection_with_embedder(&server).await;

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "add")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "upsert")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "get")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": ["ID1", "ID2", "ID5"],
            "documents": ["D1", "D2", "D2"],
        })))
        .mount(&server)
        .await;

    coll.add(vec![
        Record::new("ID1").with_document("D1"),
        Record::new("ID2").with_document("D2"),
    ])
    .await
    .unwrap();

    coll.upsert(vec![
        Record::new("ID1").with_document("D1"),
        Record::new("ID5").with_document("D2"),
    ])
    .await
    .unwrap();

    let got = coll.get(GetParams::new()).await.unwrap();
    assert_eq!(got.ids, vec!["ID1", "ID2", "ID5"]);
    assert_eq!(
        got.documents,
        Some(vec![Some("D1".to_string()), Some("D2".to_string()), Some("D2".to_string())])
    );
}

#[tokio::test]
async fn update_leaves_a_missing_embedding_absent_instead_of_generating_one() {
    let server = MockServer::start().await;
    // Bound to DummyEmbedding, which errors if ever invoked: update must
    // never call it even though the record below has no embedding.
    let coll = collection_without_embedder(&server).await;

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "update")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    coll.update(vec![Record::new("a").with_document("revised text")])
        .await
        .unwrap();
}

#[tokio::test]
async fn update_rejects_a_record_with_no_id() {
    let server = MockServer::start().await;
    let coll = collection_without_embedder(&server).await;

    let err = coll
        .update(vec![Record::new("").with_document("x")])
        .await
        .unwrap_err();
    assert!(matches!(err, chromium_rs::ChromiumError::ValidationFailure(_)));
}

#[tokio::test]
async fn delete_requires_at_least_one_selector() {
    let server = MockServer::start().await;
    let coll = collection_without_embedder(&server).await;

    let err = coll.delete(None, None, None).await.unwrap_err();
    assert!(matches!(err, chromium_rs::ChromiumError::ValidationFailure(_)));
}

#[tokio::test]
async fn delete_by_ids_succeeds() {
    let server = MockServer::start().await;
    let coll = collection_without_embedder(&server).await;

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "delete")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    coll.delete(Some(vec!["a".to_string()]), None, None).await.unwrap();
}

#[tokio::test]
async fn count_and_modify_name() {
    let server = MockServer::start().await;
    let coll = collection_without_embedder(&server).await;

    Mock::given(method("GET"))
        .and(path(collection_path("col-1", "count")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(2)))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/v2/tenants/default_tenant/databases/default_database/collections/col-1/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    assert_eq!(coll.count().await.unwrap(), 2);
    coll.modify_name("renamed").await.unwrap();
    assert_eq!(coll.name(), "renamed");
}
