//! Compiles Lucene-style search expressions into typed, model-aware
//! condition trees.
//!
//! ```text
//! query text ─ normalize ─ Lexer ─ Parser ─▶ QueryAst
//!                                               │
//!                         QueryCompiler::compile ▼
//!        RuleBuilder ─ ModelResolver ─ ModelContext ─ typify
//!                                               │
//!                                               ▼
//!                                        ConditionTree ─▶ SqlCompiler (optional)
//! ```
//!
//! ```
//! use condition_compiler::{catalog::ModelCatalog, compiler::{Junction, QueryCompiler}};
//!
//! let compiler = QueryCompiler::default();
//! let tree = compiler
//!     .compile_str("status:Open or status:Pending", &ModelCatalog::default())
//!     .unwrap();
//! assert_eq!(tree.junction, Junction::And);
//! assert_eq!(tree.rules.len(), 1);
//! ```

pub mod ast;
pub mod catalog;
pub mod collapse;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod range;
pub mod rule;
pub mod sql_compiler;
pub mod token;
pub mod value;

pub use compiler::{ConditionEntry, ConditionTree, ContextParameters, Junction, QueryCompiler};
pub use error::{CompileError, ConversionError};
