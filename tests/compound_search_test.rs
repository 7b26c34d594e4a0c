//! Compound searches: filter blocks, flags, OR and AND combination

mod common;

use common::*;
use facet_query::search::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

fn engine() -> Arc<InMemoryEngine> {
    let engine = Arc::new(InMemoryEngine::new());
    for (uuid, tissue, status) in [
        ("liver-1", "liver", "released"),
        ("liver-2", "liver", "in review"),
        ("heart-1", "heart", "released"),
        ("brain-1", "brain", "released"),
    ] {
        engine.insert(
            "sample",
            uuid,
            doc("Sample", uuid, status, &[EVERYONE], json!({"tissue": tissue})),
        );
    }
    engine
}

fn request(body: Value) -> CompoundSearchRequest {
    serde_json::from_value(body).unwrap()
}

async fn uuids(service: &SearchService, body: Value) -> BTreeSet<String> {
    match service
        .compound_search(vec![EVERYONE.to_string()], &request(body))
        .await
    {
        Ok(SearchOutput::Page { response, session }) => {
            assert!(session.session.is_none());
            response
                .graph
                .iter()
                .filter_map(|doc| doc["uuid"].as_str().map(str::to_string))
                .collect()
        }
        Ok(_) => panic!("expected a formatted page"),
        Err(e) => panic!("compound search failed: {}", e),
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_blocks_are_joined_with_or() {
    let service = service(engine());
    let found = uuids(
        &service,
        json!({
            "search_type": "Sample",
            "filter_blocks": [
                {"query": "tissue=liver", "flags_applied": []},
                {"query": "tissue=heart", "flags_applied": []}
            ]
        }),
    )
    .await;

    assert_eq!(found, set(&["liver-1", "liver-2", "heart-1"]));
}

#[tokio::test]
async fn test_intersect_joins_blocks_with_and() {
    let service = service(engine());
    let body = json!({
        "search_type": "Sample",
        "intersect": true,
        "filter_blocks": [
            {"query": "tissue=liver", "flags_applied": []},
            {"query": "status=released", "flags_applied": []}
        ]
    });

    assert_eq!(uuids(&service, body).await, set(&["liver-1"]));
}

#[tokio::test]
async fn test_flags_and_global_flags_extend_blocks() {
    let service = service(engine());
    let found = uuids(
        &service,
        json!({
            "search_type": "Sample",
            "global_flags": "status=released",
            "flags": [{"name": "hearts", "query": "tissue=heart"}],
            "filter_blocks": [
                {"query": "", "flags_applied": ["hearts"]},
                {"query": "tissue=liver", "flags_applied": []}
            ]
        }),
    )
    .await;

    assert_eq!(found, set(&["heart-1", "liver-1"]));
}

#[tokio::test]
async fn test_single_block_behaves_like_regular_search() {
    let engine = engine();
    let service = service(engine.clone());
    let found = uuids(
        &service,
        json!({
            "search_type": "Sample",
            "filter_blocks": [{"query": "tissue=brain", "flags_applied": []}]
        }),
    )
    .await;

    assert_eq!(found, set(&["brain-1"]));
    assert_eq!(engine.calls()[0].indices, "sample");
}

#[tokio::test]
async fn test_unknown_flag_is_rejected() {
    let engine = engine();
    let service = service(engine.clone());
    let result = service
        .compound_search(
            vec![EVERYONE.to_string()],
            &request(json!({
                "search_type": "Sample",
                "filter_blocks": [{"query": "", "flags_applied": ["missing"]}]
            })),
        )
        .await;

    match result {
        Err(SearchError::UnknownFlag { block, flag }) => {
            assert_eq!(block, 0);
            assert_eq!(flag, "missing");
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("unknown flag must be rejected"),
    }
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_every_branch_carries_the_permission_filter() {
    let engine = engine();
    let service = service(engine.clone());
    uuids(
        &service,
        json!({
            "search_type": "Sample",
            "filter_blocks": [
                {"query": "tissue=liver", "flags_applied": []},
                {"query": "tissue=heart", "flags_applied": []},
                {"query": "tissue=brain", "flags_applied": []}
            ]
        }),
    )
    .await;

    let body = &engine.calls()[0].body;
    let branches = body["query"]["bool"]["should"].as_array().unwrap();
    assert_eq!(branches.len(), 3);
    for branch in branches {
        let guard = &branch["bool"]["filter"][0]["bool"]["must"][0];
        assert_eq!(guard, &json!({"terms": {PERMISSION_FIELD: [EVERYONE]}}));
    }
}

#[tokio::test]
async fn test_compound_facets_share_the_joined_query() {
    let engine = engine();
    let service = service(engine.clone());
    let output = service
        .compound_search(
            vec![EVERYONE.to_string()],
            &request(json!({
                "search_type": "Sample",
                "filter_blocks": [
                    {"query": "tissue=liver", "flags_applied": []},
                    {"query": "tissue=heart", "flags_applied": []}
                ]
            })),
        )
        .await
        .unwrap();

    let SearchOutput::Page { response, .. } = output else {
        panic!("expected a formatted page")
    };
    let tissue = response.facets.iter().find(|f| f.field == "tissue").unwrap();
    let keys: BTreeSet<&str> = tissue.terms.iter().map(|t| t.key.as_str()).collect();
    let expected: BTreeSet<&str> = ["heart", "liver"].into_iter().collect();
    assert_eq!(keys, expected);
}
