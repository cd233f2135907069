//! Cypher rendering for derived finders and list queries.
//!
//! All rendering is parameterized: values travel as named parameters
//! (`$p0..$pn`), never spliced into the query text. Derived finders order by
//! `id(n)` so results come back in a stable order.

use relish_core::{Direction, Page, SortDirection, SortOrder, WireValue};

use crate::finder::BoundFinder;

/// A rendered query: text plus named parameters.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub params: Vec<(String, WireValue)>,
}

/// Render a bound finder to a parameterized Cypher query returning `n`.
pub fn render_finder(finder: &BoundFinder) -> Rendered {
    let mut text = format!("MATCH (n:{})", finder.label);
    let mut wheres = Vec::new();
    let mut params = Vec::new();

    for (i, pred) in finder.predicates.iter().enumerate() {
        let param = format!("p{i}");
        match &pred.hop {
            None => {
                wheres.push(format!("n.{} = ${param}", pred.property));
            }
            Some(hop) => {
                let alias = format!("t{i}");
                text.push_str(&format!(
                    "\nMATCH (n){}({alias}:{})",
                    rel_pattern(&hop.rel_type, hop.direction),
                    hop.target_label
                ));
                wheres.push(format!("{alias}.{} = ${param}", pred.property));
            }
        }
        params.push((param, pred.value.clone()));
    }

    if !wheres.is_empty() {
        text.push_str("\nWHERE ");
        text.push_str(&wheres.join(" AND "));
    }
    text.push_str("\nRETURN n, id(n) AS id\nORDER BY id(n)");

    Rendered { text, params }
}

/// Render a sorted, paginated label scan.
pub fn render_list(label: &str, sort: &SortOrder, page: &Page) -> Rendered {
    let dir = match sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    let text = format!(
        "MATCH (n:{label})\nRETURN n, id(n) AS id\nORDER BY n.{} {dir}\nSKIP $skip LIMIT $limit",
        sort.property
    );
    let params = vec![
        ("skip".to_string(), WireValue::Int(page.offset() as i64)),
        ("limit".to_string(), WireValue::Int(page.limit() as i64)),
    ];
    Rendered { text, params }
}

/// Relationship pattern fragment for a hop, arrowed by direction.
fn rel_pattern(rel_type: &str, direction: Direction) -> String {
    match direction {
        Direction::Outgoing => format!("-[:{rel_type}]->"),
        Direction::Incoming => format!("<-[:{rel_type}]-"),
        Direction::Undirected => format!("-[:{rel_type}]-"),
    }
}
