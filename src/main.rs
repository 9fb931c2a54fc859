use anyhow::{Context, Result};
use condition_compiler::ast::ScalarValue;
use condition_compiler::catalog::ModelCatalog;
use condition_compiler::config::CompilerConfig;
use condition_compiler::sql_compiler::SqlCompiler;
use condition_compiler::{ContextParameters, QueryCompiler};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CATALOG: &str = "catalog.json";
const DEFAULT_CONFIG: &str = "compiler.json";

/// Loads the compiler configuration, falling back to defaults.
fn load_config() -> CompilerConfig {
    match CompilerConfig::from_json_file(DEFAULT_CONFIG) {
        Ok(config) => {
            info!(path = DEFAULT_CONFIG, "loaded compiler configuration");
            config
        }
        Err(e) => {
            warn!(error = %e, "using default compiler configuration");
            CompilerConfig::default()
        }
    }
}

/// Session state changed by `:` commands.
struct Session {
    context_instance_id: Option<String>,
    bound_value: Option<ScalarValue>,
    show_sql: bool,
}

impl Session {
    /// Handles a `:` command, returning a message for the user.
    fn command(&mut self, line: &str) -> String {
        let (name, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match name {
            ":bind" if arg.is_empty() => {
                self.bound_value = None;
                "bound value cleared".to_string()
            }
            ":bind" => {
                let value = ScalarValue::from_bare(arg);
                let message = format!("bound value set to {value}");
                self.bound_value = Some(value);
                message
            }
            ":context" if arg.is_empty() => {
                self.context_instance_id = None;
                "context instance cleared".to_string()
            }
            ":context" => {
                self.context_instance_id = Some(arg.to_string());
                format!("context instance set to {arg}")
            }
            ":sql" => {
                self.show_sql = !self.show_sql;
                format!("sql output {}", if self.show_sql { "on" } else { "off" })
            }
            _ => format!("unknown command {name}; try :bind, :context or :sql"),
        }
    }

    fn compile(&self, compiler: &QueryCompiler, catalog: &ModelCatalog, line: &str) -> Result<()> {
        let query = compiler.parse(line)?;
        let params = ContextParameters {
            query,
            context_instance_id: self.context_instance_id.clone(),
            bound_value: self.bound_value.clone(),
        };
        let tree = compiler.compile(&params, catalog)?;
        println!("{}", serde_json::to_string_pretty(&tree)?);
        if self.show_sql {
            println!("{}", SqlCompiler::new("entities", compiler.config()).compile(&tree));
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let catalog_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CATALOG.to_string());
    let catalog = match ModelCatalog::from_json_file(&catalog_path) {
        Ok(catalog) => {
            info!(path = %catalog_path, types = catalog.types.len(), "loaded model catalog");
            catalog
        }
        Err(e) => {
            warn!(error = %e, "starting with an empty model catalog");
            ModelCatalog::default()
        }
    };
    let compiler = QueryCompiler::new(load_config());

    let mut editor = DefaultEditor::new().context("cannot start line editor")?;
    let mut session = Session { context_instance_id: None, bound_value: None, show_sql: false };
    println!("condition compiler; enter a query, :bind <value>, :context <id>, :sql, or Ctrl-D to quit");

    loop {
        match editor.readline("query> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line.starts_with(':') {
                    println!("{}", session.command(line));
                } else if let Err(e) = session.compile(&compiler, &catalog, line) {
                    println!("error: {e:#}");
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
