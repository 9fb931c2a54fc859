//! Decomposition of `field:[lower TO upper]` terms.

use crate::ast::{NodeId, NodeKind, QueryAst, Term};
use crate::error::{CompileError, Result};
use crate::value::{DateFormat, TypedValue};

/// The bound terms of a range node, `None` for an open `*` bound.
pub fn bound_terms(ast: &QueryAst, range: NodeId) -> Result<(Option<&Term>, Option<&Term>)> {
    let unsupported = || CompileError::UnsupportedNode { fragment: ast.render(range) };

    let [lower, upper] = ast.children(range) else {
        return Err(unsupported());
    };
    let bound = |id: NodeId| match ast.kind(id) {
        NodeKind::Field { term, .. } if term.is_bare("*") => Ok(None),
        NodeKind::Field { term, .. } => Ok(Some(term)),
        _ => Err(unsupported()),
    };
    Ok((bound(*lower)?, bound(*upper)?))
}

/// Returns the `(lower, upper)` bounds of a range node. `*` is an open bound.
/// Bounds that parse with `date_format` become date/times, anything else is
/// kept as a literal string.
pub fn extract_range(
    ast: &QueryAst,
    range: NodeId,
    date_format: &DateFormat,
) -> Result<(Option<TypedValue>, Option<TypedValue>)> {
    let (lower, upper) = bound_terms(ast, range)?;
    let typed = |term: Option<&Term>| {
        term.map(|term| {
            let text = term.value.to_string();
            match date_format.parse(&text) {
                Ok(dt) => TypedValue::date_time(&dt),
                Err(_) => TypedValue::Literal(text),
            }
        })
    };
    Ok((typed(lower), typed(upper)))
}
