//! Integration tests for nested predicate trees: `and`/`or` combinators
//! several levels deep, and document-only (`where_document`) predicates
//! used on their own, serialized exactly as the server's dialect expects.

use chromium_rs::{and, contains, doc_or, eq, gt, not_contains, or, Client, GetParams};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{collection_path, collections_path, mount_preflight, test_config, DummyEmbedding};

async fn collection(server: &MockServer) -> chromium_rs::Collection<DummyEmbedding> {
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
async fn three_level_nested_predicate_serializes_exactly() {
    let server = MockServer::start().await;
    let coll = collection(&server).await;

    // (tag = "x" AND score > 15) OR (tag = "y" AND score > 50)
    let expr = or(vec![
        and(vec![eq("tag", json!("x")), gt("score", json!(15))]),
        and(vec![eq("tag", json!("y")), gt("score", json!(50))]),
    ])
    .unwrap();

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "get")))
        .and(body_partial_json(json!({
            "where": {
                "$or": [
                    {"$and": [{"tag": {"$eq": "x"}}, {"score": {"$gt": 15}}]},
                    {"$and": [{"tag": {"$eq": "y"}}, {"score": {"$gt": 50}}]},
                ],
            },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["qa1", "qa3"]})))
        .mount(&server)
        .await;

    let mut params = GetParams::new();
    params.filter = Some(expr);
    let got = coll.get(params).await.unwrap();
    assert_eq!(got.ids.len(), 2);
}

#[tokio::test]
async fn document_only_or_predicate_needs_no_metadata_filter() {
    let server = MockServer::start().await;
    let coll = collection(&server).await;

    let doc_expr = doc_or(vec![contains("rust"), contains("database")]).unwrap();

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "get")))
        .and(body_partial_json(json!({
            "where_document": {"$or": [{"$contains": "rust"}, {"$contains": "database"}]},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["qa1", "qa2"]})))
        .mount(&server)
        .await;

    let mut params = GetParams::new();
    params.document_filter = Some(doc_expr);
    let got = coll.get(params).await.unwrap();
    assert_eq!(got.ids.len(), 2);
}

#[tokio::test]
async fn not_contains_excludes_matching_documents() {
    let server = MockServer::start().await;
    let coll = collection(&server).await;

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "get")))
        .and(body_partial_json(json!({
            "where_document": {"$not_contains": "deprecated"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["qa1"]})))
        .mount(&server)
        .await;

    let mut params = GetParams::new();
    params.document_filter = Some(not_contains("deprecated").unwrap());
    let got = coll.get(params).await.unwrap();
    assert_eq!(got.ids, vec!["qa1".to_string()]);
}

#[tokio::test]
async fn in_and_nin_operators_carry_their_value_lists() {
    let server = MockServer::start().await;
    let coll = collection(&server).await;

    let expr = chromium_rs::in_("tag", vec![json!("x"), json!("y")]).unwrap();

    Mock::given(method("POST"))
        .and(path(collection_path("col-1", "get")))
        .and(body_partial_json(json!({
            "where": {"tag": {"$in": ["x", "y"]}},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ids": ["qa1", "qa3"]})))
        .mount(&server)
        .await;

    let mut params = GetParams::new();
    params.filter = Some(expr);
    let got = coll.get(params).await.unwrap();
    assert_eq!(got.ids.len(), 2);
}
