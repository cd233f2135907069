//! relish-query: the query derivation engine.
//!
//! Two declaration styles feed this crate: finder names such as
//! `by_name_and_category_name`, derived into property-path predicates with
//! AND semantics, and explicit query templates with positional `$1..$n`
//! parameters. Both are validated up front, bound to argument values, and
//! rendered to parameterized Cypher. The engine is stateless across calls.

pub mod cypher;
pub mod error;
pub mod finder;
pub mod statement;

pub use error::QueryError;
pub use finder::{BoundFinder, Finder, Hop, Predicate};
pub use statement::{BoundStatement, RowShape, Statement};
