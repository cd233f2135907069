//! Integration tests for relish-graph against a live Neo4j instance.
//!
//! These tests require a Neo4j server reachable at the default backend
//! configuration (override with RELISH_BACKEND__* environment variables).
//! Run with: cargo test --package relish-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use std::collections::BTreeMap;

use relish_core::config::BackendConfig;
use relish_core::{EntityId, Page, SortOrder, WireValue};
use relish_graph::{GraphBackend, Neo4jBackend, NodeHandle, WriteOp};
use relish_query::{BoundFinder, Predicate, Statement};

// Labels reserved for these tests so cleanup cannot touch real data.
const NODE: &str = "RelishItIngredient";
const OTHER: &str = "RelishItRecipe";

async fn connect_or_skip() -> Option<Neo4jBackend> {
    let config = BackendConfig::default();
    match Neo4jBackend::connect(&config).await {
        Ok(backend) => Some(backend),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

async fn cleanup(backend: &Neo4jBackend) {
    for label in [NODE, OTHER] {
        let stmt = Statement::parse(format!("MATCH (n:{label}) DETACH DELETE n"))
            .expect("static query parses")
            .bind(vec![])
            .expect("no parameters");
        let _ = backend.run(&stmt).await;
    }
}

fn props(pairs: &[(&str, WireValue)]) -> BTreeMap<String, WireValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn create_and_fetch_node() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    let assigned = backend
        .apply(&[WriteOp::CreateNode {
            label: NODE.into(),
            props: props(&[
                ("name", WireValue::Text("sage".into())),
                ("rating", WireValue::Int(5)),
            ]),
        }])
        .await
        .unwrap();
    let id = assigned[0].expect("create assigns an identity");

    let record = backend.fetch_node(NODE, id).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.label, NODE);
    assert_eq!(record.props.get("name"), Some(&WireValue::Text("sage".into())));
    assert_eq!(record.props.get("rating"), Some(&WireValue::Int(5)));

    cleanup(&backend).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn fetch_missing_node_is_none() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    let found = backend.fetch_node(NODE, EntityId(-1)).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn batch_creates_rel_to_new_node() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    let assigned = backend
        .apply(&[
            WriteOp::CreateNode {
                label: OTHER.into(),
                props: props(&[("name", WireValue::Text("soup".into()))]),
            },
            WriteOp::CreateNode {
                label: NODE.into(),
                props: props(&[("name", WireValue::Text("leek".into()))]),
            },
            WriteOp::CreateRel {
                rel_type: "RELISH_IT_CONTAINS".into(),
                start: NodeHandle::Created(0),
                end: NodeHandle::Created(1),
                props: props(&[("grams", WireValue::Int(200))]),
            },
        ])
        .await
        .unwrap();
    assert!(assigned.iter().all(Option::is_some));

    let neighbors = backend.neighbors(&[assigned[0].unwrap()]).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].rel.rel_type, "RELISH_IT_CONTAINS");
    assert_eq!(neighbors[0].rel.props.get("grams"), Some(&WireValue::Int(200)));
    assert_eq!(neighbors[0].node.label, NODE);

    cleanup(&backend).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn update_sets_and_removes_properties() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    let assigned = backend
        .apply(&[WriteOp::CreateNode {
            label: NODE.into(),
            props: props(&[
                ("name", WireValue::Text("basil".into())),
                ("note", WireValue::Text("wilts fast".into())),
            ]),
        }])
        .await
        .unwrap();
    let id = assigned[0].unwrap();

    backend
        .apply(&[WriteOp::UpdateNode {
            id,
            set: props(&[("name", WireValue::Text("thai basil".into()))]),
            unset: vec!["note".into()],
        }])
        .await
        .unwrap();

    let record = backend.fetch_node(NODE, id).await.unwrap().unwrap();
    assert_eq!(
        record.props.get("name"),
        Some(&WireValue::Text("thai basil".into()))
    );
    assert!(!record.props.contains_key("note"));

    cleanup(&backend).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn list_sorts_and_paginates() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    let ops: Vec<WriteOp> = (1..=4)
        .map(|i| WriteOp::CreateNode {
            label: NODE.into(),
            props: props(&[("rank", WireValue::Int(i))]),
        })
        .collect();
    backend.apply(&ops).await.unwrap();

    let page = backend
        .list(NODE, &SortOrder::desc("rank"), &Page::new(0, 2))
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].props.get("rank"), Some(&WireValue::Int(4)));
    assert_eq!(page[1].props.get("rank"), Some(&WireValue::Int(3)));

    cleanup(&backend).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn finder_filters_by_property() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    backend
        .apply(&[
            WriteOp::CreateNode {
                label: NODE.into(),
                props: props(&[("name", WireValue::Text("fennel".into()))]),
            },
            WriteOp::CreateNode {
                label: NODE.into(),
                props: props(&[("name", WireValue::Text("dill".into()))]),
            },
        ])
        .await
        .unwrap();

    let finder = BoundFinder {
        label: NODE.into(),
        predicates: vec![Predicate {
            hop: None,
            property: "name".into(),
            value: WireValue::Text("dill".into()),
        }],
    };
    let found = backend.find(&finder).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].props.get("name"), Some(&WireValue::Text("dill".into())));

    cleanup(&backend).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn explicit_statement_returns_rows() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    backend
        .apply(&[WriteOp::CreateNode {
            label: NODE.into(),
            props: props(&[("name", WireValue::Text("caper".into()))]),
        }])
        .await
        .unwrap();

    let stmt = Statement::parse(format!(
        "MATCH (n:{NODE}) WHERE n.name = $1 RETURN n.name AS name, 1 AS one"
    ))
    .unwrap()
    .bind(vec!["caper".into()])
    .unwrap();
    let rows = backend.run(&stmt).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&WireValue::Text("caper".into())));
    assert_eq!(rows[0].get("one"), Some(&WireValue::Int(1)));

    cleanup(&backend).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn delete_node_detaches() {
    let Some(backend) = connect_or_skip().await else {
        return;
    };
    cleanup(&backend).await;

    let assigned = backend
        .apply(&[
            WriteOp::CreateNode {
                label: NODE.into(),
                props: BTreeMap::new(),
            },
            WriteOp::CreateNode {
                label: OTHER.into(),
                props: BTreeMap::new(),
            },
            WriteOp::CreateRel {
                rel_type: "RELISH_IT_CONTAINS".into(),
                start: NodeHandle::Created(1),
                end: NodeHandle::Created(0),
                props: BTreeMap::new(),
            },
        ])
        .await
        .unwrap();

    backend
        .apply(&[WriteOp::DeleteNode {
            id: assigned[0].unwrap(),
        }])
        .await
        .unwrap();

    assert_eq!(backend.count(NODE).await.unwrap(), 0);
    let neighbors = backend.neighbors(&[assigned[1].unwrap()]).await.unwrap();
    assert!(neighbors.is_empty());

    cleanup(&backend).await;
}
