//! Arena representation of a parsed query.
//!
//! Every node lives in a flat vector and refers to its parent and children by
//! index, so the tree can be walked upwards without back-pointers.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Index of a node inside a [`QueryAst`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// A raw scalar as written in the query or supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    Null,
    List(Vec<ScalarValue>),
}

impl ScalarValue {
    /// Classifies a bare (unquoted) query token by its shape.
    pub fn from_bare(text: &str) -> Self {
        if let Ok(n) = text.parse::<i64>() {
            return ScalarValue::Integer(n);
        }
        if text.contains('.') {
            if let Ok(f) = text.parse::<f64>() {
                if f.is_finite() {
                    return ScalarValue::Float(f);
                }
            }
        }
        match text {
            "true" => ScalarValue::Boolean(true),
            "false" => ScalarValue::Boolean(false),
            _ => ScalarValue::String(text.to_string()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => write!(f, "{s}"),
            ScalarValue::Integer(n) => write!(f, "{n}"),
            ScalarValue::Float(x) => write!(f, "{x}"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::Date(d) => write!(f, "{d}"),
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The value side of a `field:value` term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub value: ScalarValue,
    /// Quoted terms are always taken literally, never as placeholders.
    pub quoted: bool,
}

impl Term {
    pub fn bare(text: &str) -> Self {
        Self { value: ScalarValue::from_bare(text), quoted: false }
    }

    pub fn quoted(text: &str) -> Self {
        Self { value: ScalarValue::String(text.to_string()), quoted: true }
    }

    /// True when this is an unquoted string equal to `token`.
    pub fn is_bare(&self, token: &str) -> bool {
        !self.quoted && matches!(&self.value, ScalarValue::String(s) if s == token)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "\"{}\"", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// The closed set of node shapes a query can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Conjunction of all children.
    And,
    /// Disjunction of all children.
    Or,
    /// Parenthesised sub-expression.
    Group,
    /// A single `field:value` term.
    Field { field: String, term: Term },
    /// `field:[lower TO upper]`. Always has two `Field` children holding the bounds.
    Range { field: String, lower_inclusive: bool, upper_inclusive: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A parsed query. Nodes are immutable once the parser hands the tree over.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    nodes: Vec<Node>,
    root: NodeId,
}

impl QueryAst {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// # Panics
    /// Panics when `id` was not produced by this arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follows single-child groups down to the first meaningful node.
    pub fn unwrap_groups(&self, mut id: NodeId) -> NodeId {
        while let NodeKind::Group = self.kind(id) {
            match self.children(id) {
                [only] => id = *only,
                _ => break,
            }
        }
        id
    }

    /// Iterates the ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Renders the subtree rooted at `id` back into query syntax, for diagnostics.
    pub fn render(&self, id: NodeId) -> String {
        let node = self.node(id);
        let joined = |sep: &str| {
            node.children
                .iter()
                .map(|child| self.render(*child))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match &node.kind {
            NodeKind::And => joined(" AND "),
            NodeKind::Or => joined(" OR "),
            NodeKind::Group => format!("({})", joined(" ")),
            NodeKind::Field { field, term } => format!("{field}:{term}"),
            NodeKind::Range { field, lower_inclusive, upper_inclusive } => {
                let bound = |i: usize| match node.children.get(i).map(|c| self.kind(*c)) {
                    Some(NodeKind::Field { term, .. }) => term.to_string(),
                    _ => "?".to_string(),
                };
                format!(
                    "{field}:{}{} TO {}{}",
                    if *lower_inclusive { '[' } else { '{' },
                    bound(0),
                    bound(1),
                    if *upper_inclusive { ']' } else { '}' },
                )
            }
        }
    }
}

/// Builds a [`QueryAst`] bottom-up; parent links are filled in when a node
/// adopts its children.
#[derive(Debug, Default)]
pub struct AstBuilder {
    nodes: Vec<Node>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(&mut self, kind: NodeKind) -> NodeId {
        self.push(kind, Vec::new())
    }

    pub fn branch(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        self.push(kind, children)
    }

    fn push(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        for child in &children {
            self.nodes[child.0].parent = Some(id);
        }
        self.nodes.push(Node { kind, parent: None, children });
        id
    }

    pub fn finish(self, root: NodeId) -> QueryAst {
        QueryAst { nodes: self.nodes, root }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(b: &mut AstBuilder, name: &str, value: &str) -> NodeId {
        b.leaf(NodeKind::Field { field: name.to_string(), term: Term::bare(value) })
    }

    #[test]
    fn test_parent_links() {
        let mut b = AstBuilder::new();
        let a = field(&mut b, "a", "1");
        let c = field(&mut b, "c", "2");
        let group = b.branch(NodeKind::Group, vec![c]);
        let root = b.branch(NodeKind::And, vec![a, group]);
        let ast = b.finish(root);

        assert_eq!(ast.parent(a), Some(root));
        assert_eq!(ast.parent(c), Some(group));
        assert_eq!(ast.parent(root), None);
        assert_eq!(ast.ancestors(c).collect::<Vec<_>>(), vec![group, root]);
    }

    #[test]
    fn test_unwrap_nested_groups() {
        let mut b = AstBuilder::new();
        let a = field(&mut b, "a", "1");
        let inner = b.branch(NodeKind::Group, vec![a]);
        let outer = b.branch(NodeKind::Group, vec![inner]);
        let ast = b.finish(outer);
        assert_eq!(ast.unwrap_groups(outer), a);
    }

    #[test]
    fn test_scalar_shapes() {
        assert_eq!(ScalarValue::from_bare("42"), ScalarValue::Integer(42));
        assert_eq!(ScalarValue::from_bare("-3.5"), ScalarValue::Float(-3.5));
        assert_eq!(ScalarValue::from_bare("true"), ScalarValue::Boolean(true));
        assert_eq!(
            ScalarValue::from_bare("2020-01-01"),
            ScalarValue::String("2020-01-01".to_string())
        );
        assert_eq!(ScalarValue::from_bare("NaN"), ScalarValue::String("NaN".to_string()));
    }

    #[test]
    fn test_render() {
        let mut b = AstBuilder::new();
        let a = field(&mut b, "a", "1");
        let lo = field(&mut b, "d", "*");
        let hi = field(&mut b, "d", "2020-12-31");
        let range = b.branch(
            NodeKind::Range { field: "d".to_string(), lower_inclusive: true, upper_inclusive: false },
            vec![lo, hi],
        );
        let root = b.branch(NodeKind::Or, vec![a, range]);
        let ast = b.finish(root);
        assert_eq!(ast.render(root), "a:1 OR d:[* TO 2020-12-31}");
    }
}
