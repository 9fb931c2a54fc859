//! Compiles a parsed query into a [`ConditionTree`].
//!
//! ```text
//! compile()
//!   ├─ root is a leaf            → AND tree with one rule
//!   ├─ root is a collapsible OR  → AND tree with one multi-valued rule
//!   └─ otherwise                 → build()
//!
//! build(node)
//!   ├─ Range with two bounds     → tree with one Between rule, typed when
//!   │                              a type constraint governs it
//!   ├─ And / Or                  → junction, then for each child:
//!   │    ├─ Field                → RuleBuilder
//!   │    └─ Or / And / Range     → try_collapse(), else nested build()
//!   └─ anything else             → UnsupportedNode
//! ```
//!
//! Single-child groups are unwrapped wherever a node is dispatched.

use crate::ast::{NodeId, NodeKind, QueryAst, ScalarValue};
use crate::collapse::try_collapse;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::lexer::Lexer;
use crate::model::{ModelContext, ModelResolver};
use crate::normalize::normalize;
use crate::parser::{ParseError, Parser};
use crate::rule::{FieldValue, Operator, ResolvedField, Rule, RuleBuilder};
use crate::token::Token;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Token buffer shared by every parse. Parsing holds this lock; compilation
/// does not.
static PARSER_TOKENS: Mutex<Vec<Token>> = Mutex::new(Vec::new());

/// Inputs of one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextParameters {
    pub query: QueryAst,
    /// Substituted for the `current` placeholder.
    pub context_instance_id: Option<String>,
    /// Substituted for the `?` placeholder.
    pub bound_value: Option<ScalarValue>,
}

impl ContextParameters {
    pub fn new(query: QueryAst) -> Self {
        Self { query, context_instance_id: None, bound_value: None }
    }

    pub fn with_context_instance(mut self, id: impl Into<String>) -> Self {
        self.context_instance_id = Some(id.into());
        self
    }

    pub fn with_bound_value(mut self, value: ScalarValue) -> Self {
        self.bound_value = Some(value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Junction {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConditionEntry {
    Rule(Rule),
    Tree(ConditionTree),
}

impl ConditionEntry {
    pub fn as_rule(&self) -> Option<&Rule> {
        match self {
            ConditionEntry::Rule(rule) => Some(rule),
            ConditionEntry::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ConditionTree> {
        match self {
            ConditionEntry::Tree(tree) => Some(tree),
            ConditionEntry::Rule(_) => None,
        }
    }
}

/// AND/OR junction over rules and nested trees.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionTree {
    pub junction: Junction,
    pub rules: Vec<ConditionEntry>,
}

impl ConditionTree {
    fn single(rule: Rule) -> Self {
        Self { junction: Junction::And, rules: vec![ConditionEntry::Rule(rule)] }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Normalizes and parses query text. Only the lexing and parsing run
    /// under the process-wide parser lock.
    pub fn parse(&self, text: &str) -> std::result::Result<QueryAst, ParseError> {
        let normalized = normalize(text);
        let mut tokens = PARSER_TOKENS.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.clear();
        tokens.extend(Lexer::new(&normalized));
        Parser::new(&tokens, &self.config.default_field).parse()
    }

    /// Parses `text` and compiles it without placeholder bindings.
    pub fn compile_str(&self, text: &str, model: &dyn ModelContext) -> Result<ConditionTree> {
        let params = ContextParameters::new(self.parse(text)?);
        self.compile(&params, model)
    }

    pub fn compile(&self, params: &ContextParameters, model: &dyn ModelContext) -> Result<ConditionTree> {
        let resolver = ModelResolver::new(model, &self.config.type_field);
        let walker = TreeWalker {
            ast: &params.query,
            rules: RuleBuilder::new(params, &resolver, &self.config),
        };

        let root = params.query.unwrap_groups(params.query.root());
        debug!(query = %params.query.render(root), "compiling query");
        match params.query.kind(root) {
            NodeKind::Field { .. } => Ok(ConditionTree::single(walker.leaf_rule(root)?)),
            NodeKind::Or => match try_collapse(&params.query, root) {
                Some(field) => Ok(ConditionTree::single(walker.rules.build_rule(&field)?)),
                None => walker.build(root),
            },
            _ => walker.build(root),
        }
    }
}

struct TreeWalker<'a> {
    ast: &'a QueryAst,
    rules: RuleBuilder<'a>,
}

impl TreeWalker<'_> {
    fn unsupported(&self, node: NodeId) -> CompileError {
        CompileError::UnsupportedNode { fragment: self.ast.render(node) }
    }

    fn build(&self, node: NodeId) -> Result<ConditionTree> {
        let node = self.ast.unwrap_groups(node);
        let children = self.ast.children(node);

        let junction = match self.ast.kind(node) {
            NodeKind::Range { .. } if children.len() == 2 => {
                return Ok(ConditionTree::single(self.rules.range_rule(node)?));
            }
            NodeKind::And => Junction::And,
            NodeKind::Or => Junction::Or,
            _ => return Err(self.unsupported(node)),
        };
        if children.is_empty() {
            return Err(self.unsupported(node));
        }

        let mut rules = Vec::with_capacity(children.len());
        for child in children {
            let child = self.ast.unwrap_groups(*child);
            let entry = match self.ast.kind(child) {
                NodeKind::Field { .. } => ConditionEntry::Rule(self.leaf_rule(child)?),
                _ => match try_collapse(self.ast, child) {
                    Some(field) => ConditionEntry::Rule(self.rules.build_rule(&field)?),
                    None => ConditionEntry::Tree(self.build(child)?),
                },
            };
            rules.push(entry);
        }
        Ok(ConditionTree { junction, rules })
    }

    fn leaf_rule(&self, node: NodeId) -> Result<Rule> {
        let NodeKind::Field { field, term } = self.ast.kind(node) else {
            return Err(self.unsupported(node));
        };
        self.rules.build_rule(&ResolvedField {
            key: field.clone(),
            value: FieldValue::Single(term.clone()),
            operator: Operator::Equals,
            source_node: node,
        })
    }
}
