//! Rewrites `f:a OR f:b OR f:c` into a single multi-valued field.

use crate::ast::{NodeId, NodeKind, QueryAst, Term};
use crate::rule::{FieldValue, Operator, ResolvedField};
use tracing::debug;

/// Collapses a disjunction whose direct children are all plain `field:value`
/// leaves on the same field. Values keep their order; duplicates are dropped.
///
/// Returns `None` for anything else, and the caller compiles the node as a
/// nested tree instead.
pub fn try_collapse(ast: &QueryAst, node: NodeId) -> Option<ResolvedField> {
    if !matches!(ast.kind(node), NodeKind::Or) {
        return None;
    }

    let mut key: Option<&str> = None;
    let mut values: Vec<Term> = Vec::new();
    for child in ast.children(node) {
        let NodeKind::Field { field, term } = ast.kind(*child) else {
            debug!(fragment = %ast.render(node), "not collapsing: disjunction has a non-leaf child");
            return None;
        };
        match key {
            Some(k) if k != field.as_str() => {
                debug!(fragment = %ast.render(node), "not collapsing: disjunction spans several fields");
                return None;
            }
            Some(_) => {}
            None => key = Some(field.as_str()),
        }
        if !values.contains(term) {
            values.push(term.clone());
        }
    }

    let key = key?;
    debug!(field = key, values = values.len(), "collapsed disjunction");
    Some(ResolvedField {
        key: key.to_string(),
        value: FieldValue::List(values),
        operator: Operator::Equals,
        source_node: node,
    })
}
