//! Neo4j connection management and the production [`GraphBackend`].
//!
//! Write batches render to parameterized Cypher and run inside a single
//! transaction; node and relationship identities come from `id()`. Property
//! values always travel as query parameters, never spliced into query text.
//! Labels and relationship types come from the validated schema registry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query, Txn};
use relish_core::config::BackendConfig;
use relish_core::{EntityId, Page, SortOrder, WireValue};
use relish_query::{cypher, BoundFinder, BoundStatement};

use crate::backend::{
    GraphBackend, GraphError, NeighborRecord, NodeHandle, NodeRecord, RelRecord, Row, WriteOp,
};

/// Thread-safe Neo4j backend with connection pooling.
///
/// Clone is cheap (inner Arc). Shared across sessions; transactional
/// consistency is the database's.
#[derive(Clone)]
pub struct Neo4jBackend {
    graph: Graph,
}

impl Neo4jBackend {
    /// Connect with the given configuration.
    pub async fn connect(config: &BackendConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a read query and collect all rows.
    async fn query_rows(&self, q: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    async fn query_one(&self, q: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        Ok(stream.next().await?)
    }

    /// Run the whole batch inside `txn`, returning assigned identities.
    async fn apply_in_txn(
        &self,
        txn: &mut Txn,
        ops: &[WriteOp],
    ) -> Result<Vec<Option<EntityId>>, GraphError> {
        let mut assigned: Vec<Option<EntityId>> = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                WriteOp::CreateNode { label, props } => {
                    let mut text = format!("CREATE (n:{label})");
                    push_set_clause(&mut text, "n", props.keys());
                    text.push_str("\nRETURN id(n) AS id");
                    let q = with_value_params(query(&text), props);
                    let id = execute_returning_id(txn, q).await?;
                    assigned.push(Some(EntityId(id)));
                }
                WriteOp::UpdateNode { id, set, unset } => {
                    let mut text = "MATCH (n) WHERE id(n) = $id".to_string();
                    push_set_clause(&mut text, "n", set.keys());
                    push_remove_clause(&mut text, "n", unset);
                    let q = with_value_params(query(&text), set).param("id", id.0);
                    txn.run(q).await?;
                    assigned.push(None);
                }
                WriteOp::DeleteNode { id } => {
                    let q = query("MATCH (n) WHERE id(n) = $id DETACH DELETE n").param("id", id.0);
                    txn.run(q).await?;
                    assigned.push(None);
                }
                WriteOp::CreateRel {
                    rel_type,
                    start,
                    end,
                    props,
                } => {
                    let start = resolve_handle(*start, &assigned)?;
                    let end = resolve_handle(*end, &assigned)?;
                    let mut text = format!(
                        "MATCH (a) WHERE id(a) = $start\n\
                         MATCH (b) WHERE id(b) = $end\n\
                         CREATE (a)-[r:{rel_type}]->(b)"
                    );
                    push_set_clause(&mut text, "r", props.keys());
                    text.push_str("\nRETURN id(r) AS id");
                    let q = with_value_params(query(&text), props)
                        .param("start", start)
                        .param("end", end);
                    let id = execute_returning_id(txn, q).await?;
                    assigned.push(Some(EntityId(id)));
                }
                WriteOp::UpdateRel { id, set, unset } => {
                    let mut text = "MATCH ()-[r]->() WHERE id(r) = $id".to_string();
                    push_set_clause(&mut text, "r", set.keys());
                    push_remove_clause(&mut text, "r", unset);
                    let q = with_value_params(query(&text), set).param("id", id.0);
                    txn.run(q).await?;
                    assigned.push(None);
                }
                WriteOp::DeleteRel { id } => {
                    let q = query("MATCH ()-[r]->() WHERE id(r) = $id DELETE r").param("id", id.0);
                    txn.run(q).await?;
                    assigned.push(None);
                }
            }
        }

        Ok(assigned)
    }
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn apply(&self, ops: &[WriteOp]) -> Result<Vec<Option<EntityId>>, GraphError> {
        let mut txn = self.graph.start_txn().await?;
        match self.apply_in_txn(&mut txn, ops).await {
            Ok(assigned) => {
                txn.commit().await?;
                tracing::debug!(ops = ops.len(), "Applied write batch");
                Ok(assigned)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    async fn fetch_node(
        &self,
        label: &str,
        id: EntityId,
    ) -> Result<Option<NodeRecord>, GraphError> {
        let q = query(&format!(
            "MATCH (n:{label}) WHERE id(n) = $id RETURN n, id(n) AS id"
        ))
        .param("id", id.0);

        match self.query_one(q).await? {
            Some(row) => Ok(Some(decode_node_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn neighbors(&self, ids: &[EntityId]) -> Result<Vec<NeighborRecord>, GraphError> {
        let id_values: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let q = query(
            "MATCH (a)-[r]-(b) WHERE id(a) IN $ids
             RETURN id(a) AS src, r, id(r) AS rel_id, type(r) AS rel_type,
                    id(startNode(r)) AS start_id, id(endNode(r)) AS end_id,
                    b, id(b) AS node_id",
        )
        .param("ids", id_values);

        let rows = self.query_rows(q).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let src: i64 = row.get("src").map_err(decode_err)?;
            let rel_id: i64 = row.get("rel_id").map_err(decode_err)?;
            let rel_type: String = row.get("rel_type").map_err(decode_err)?;
            let start_id: i64 = row.get("start_id").map_err(decode_err)?;
            let end_id: i64 = row.get("end_id").map_err(decode_err)?;
            let node_id: i64 = row.get("node_id").map_err(decode_err)?;

            let rel: neo4rs::Relation = row.get("r").map_err(decode_err)?;
            let node: neo4rs::Node = row.get("b").map_err(decode_err)?;

            out.push(NeighborRecord {
                of: EntityId(src),
                rel: RelRecord {
                    id: EntityId(rel_id),
                    rel_type,
                    start: EntityId(start_id),
                    end: EntityId(end_id),
                    props: rel_props(&rel)?,
                },
                node: NodeRecord {
                    id: EntityId(node_id),
                    label: first_label(&node),
                    props: node_props(&node)?,
                },
            });
        }
        Ok(out)
    }

    async fn list(
        &self,
        label: &str,
        sort: &SortOrder,
        page: &Page,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let rendered = cypher::render_list(label, sort, page);
        let q = with_named_params(query(&rendered.text), &rendered.params);
        let rows = self.query_rows(q).await?;
        rows.iter().map(decode_node_row).collect()
    }

    async fn find(&self, finder: &BoundFinder) -> Result<Vec<NodeRecord>, GraphError> {
        let rendered = cypher::render_finder(finder);
        let q = with_named_params(query(&rendered.text), &rendered.params);
        let rows = self.query_rows(q).await?;
        rows.iter().map(decode_node_row).collect()
    }

    async fn run(&self, statement: &BoundStatement) -> Result<Vec<Row>, GraphError> {
        let q = with_named_params(query(&statement.text), &statement.params);
        let rows = self.query_rows(q).await?;
        rows.iter()
            .map(|row| {
                let map: std::collections::HashMap<String, serde_json::Value> =
                    row.to().map_err(|e| GraphError::Decode(e.to_string()))?;
                map.into_iter()
                    .map(|(k, v)| Ok((k, json_to_wire(v)?)))
                    .collect()
            })
            .collect()
    }

    async fn count(&self, label: &str) -> Result<i64, GraphError> {
        let q = query(&format!("MATCH (n:{label}) RETURN count(n) AS cnt"));
        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn resolve_handle(handle: NodeHandle, assigned: &[Option<EntityId>]) -> Result<i64, GraphError> {
    match handle {
        NodeHandle::Existing(id) => Ok(id.0),
        NodeHandle::Created(op_index) => assigned
            .get(op_index)
            .copied()
            .flatten()
            .map(|id| id.0)
            .ok_or_else(|| {
                GraphError::BadBatch(format!(
                    "relationship references op {op_index}, which assigned no identity"
                ))
            }),
    }
}

/// Append `SET alias.prop = $v_prop, ...` for each property key.
fn push_set_clause<'a>(text: &mut String, alias: &str, keys: impl Iterator<Item = &'a String>) {
    let fragments: Vec<String> = keys.map(|k| format!("{alias}.{k} = $v_{k}")).collect();
    if !fragments.is_empty() {
        text.push_str("\nSET ");
        text.push_str(&fragments.join(", "));
    }
}

/// Append `REMOVE alias.prop, ...` for each removed property.
fn push_remove_clause(text: &mut String, alias: &str, unset: &[String]) {
    if !unset.is_empty() {
        let fragments: Vec<String> = unset.iter().map(|k| format!("{alias}.{k}")).collect();
        text.push_str("\nREMOVE ");
        text.push_str(&fragments.join(", "));
    }
}

/// Attach `$v_<prop>` parameters for a property map.
fn with_value_params(mut q: Query, props: &BTreeMap<String, WireValue>) -> Query {
    for (key, value) in props {
        q = add_param(q, &format!("v_{key}"), value);
    }
    q
}

/// Attach pre-rendered named parameters.
fn with_named_params(mut q: Query, params: &[(String, WireValue)]) -> Query {
    for (name, value) in params {
        q = add_param(q, name, value);
    }
    q
}

fn add_param(q: Query, name: &str, value: &WireValue) -> Query {
    match value {
        WireValue::Int(i) => q.param(name, *i),
        WireValue::Float(f) => q.param(name, *f),
        WireValue::Bool(b) => q.param(name, *b),
        WireValue::Text(s) => q.param(name, s.clone()),
        WireValue::List(items) => match items.first() {
            Some(WireValue::Int(_)) => q.param(
                name,
                items.iter().filter_map(|v| match v {
                    WireValue::Int(i) => Some(*i),
                    _ => None,
                }).collect::<Vec<i64>>(),
            ),
            Some(WireValue::Float(_)) => q.param(
                name,
                items.iter().filter_map(|v| match v {
                    WireValue::Float(f) => Some(*f),
                    _ => None,
                }).collect::<Vec<f64>>(),
            ),
            Some(WireValue::Bool(_)) => q.param(
                name,
                items.iter().filter_map(|v| match v {
                    WireValue::Bool(b) => Some(*b),
                    _ => None,
                }).collect::<Vec<bool>>(),
            ),
            _ => q.param(
                name,
                items.iter().filter_map(|v| v.as_text().map(String::from)).collect::<Vec<String>>(),
            ),
        },
    }
}

/// Execute a create statement inside a transaction and read back `id`.
async fn execute_returning_id(txn: &mut Txn, q: Query) -> Result<i64, GraphError> {
    let mut stream = txn.execute(q).await?;
    let row = stream
        .next(txn.handle())
        .await?
        .ok_or_else(|| GraphError::Decode("create returned no identity row".to_string()))?;
    row.get::<i64>("id").map_err(decode_err)
}

fn decode_err(e: neo4rs::DeError) -> GraphError {
    GraphError::Decode(e.to_string())
}

fn first_label(node: &neo4rs::Node) -> String {
    node.labels().first().map(|l| l.to_string()).unwrap_or_default()
}

fn node_props(node: &neo4rs::Node) -> Result<BTreeMap<String, WireValue>, GraphError> {
    let mut props = BTreeMap::new();
    for key in node.keys() {
        let value: serde_json::Value = node.get(key).map_err(decode_err)?;
        props.insert(key.to_string(), json_to_wire(value)?);
    }
    Ok(props)
}

fn rel_props(rel: &neo4rs::Relation) -> Result<BTreeMap<String, WireValue>, GraphError> {
    let mut props = BTreeMap::new();
    for key in rel.keys() {
        let value: serde_json::Value = rel.get(key).map_err(decode_err)?;
        props.insert(key.to_string(), json_to_wire(value)?);
    }
    Ok(props)
}

/// Decode a row shaped `RETURN n, id(n) AS id`.
fn decode_node_row(row: &neo4rs::Row) -> Result<NodeRecord, GraphError> {
    let node: neo4rs::Node = row.get("n").map_err(decode_err)?;
    let id: i64 = row.get("id").map_err(decode_err)?;
    Ok(NodeRecord {
        id: EntityId(id),
        label: first_label(&node),
        props: node_props(&node)?,
    })
}

fn json_to_wire(value: serde_json::Value) -> Result<WireValue, GraphError> {
    match value {
        serde_json::Value::Bool(b) => Ok(WireValue::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(WireValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(WireValue::Float(f))
            } else {
                Err(GraphError::Decode(format!("unrepresentable number {n}")))
            }
        }
        serde_json::Value::String(s) => Ok(WireValue::Text(s)),
        serde_json::Value::Array(items) => Ok(WireValue::List(
            items.into_iter().map(json_to_wire).collect::<Result<_, _>>()?,
        )),
        other => Err(GraphError::Decode(format!(
            "value {other} is not wire-representable; return scalar columns"
        ))),
    }
}
