use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use sqlweave::config::{self, TranslatorConfig};
use sqlweave::expression::Expr;
use sqlweave::metadata::{CachedResolver, EntityDescriptor, EntityRegistry};
use sqlweave::Translator;

/// sqlweave - Compiles a serialized query expression tree into SQL
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Query document (JSON or YAML) with `entities` and `query`
    input: PathBuf,

    /// YAML configuration file (defaults to SQLWEAVE_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dialect preset (generic, sqlite, postgres, mysql, sql_server, oracle)
    #[arg(long)]
    dialect: Option<String>,

    /// Parameter marker prefix override
    #[arg(long)]
    parameter_prefix: Option<String>,

    /// Maximum number of in-memory list elements to unroll
    #[arg(long)]
    max_list_unroll: Option<usize>,

    /// Log generated SQL at info level
    #[arg(long)]
    log_sql: bool,

    /// Print the full result (SQL, parameters, result shape) as JSON
    #[arg(long)]
    json: bool,
}

impl From<&Cli> for config::CliConfig {
    fn from(cli: &Cli) -> Self {
        config::CliConfig {
            dialect: cli.dialect.clone(),
            parameter_prefix: cli.parameter_prefix.clone(),
            max_list_unroll: cli.max_list_unroll,
            log_sql: cli.log_sql,
        }
    }
}

/// Input file: entity descriptions plus the query tree.
#[derive(Deserialize)]
struct QueryDocument {
    #[serde(default)]
    entities: Vec<EntityDescriptor>,
    query: Expr,
}

fn load_document(path: &PathBuf) -> anyhow::Result<QueryDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let document = if is_yaml {
        serde_yaml::from_str(&content).context("parsing YAML query document")?
    } else {
        serde_json::from_str(&content).context("parsing JSON query document")?
    };
    Ok(document)
}

fn main() -> anyhow::Result<()> {
    // Initialize logger - defaults to WARN level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TranslatorConfig::from_yaml_file(path)?,
        None => TranslatorConfig::from_env()?,
    };
    config.merge(config::CliConfig::from(&cli))?;
    log::debug!("configuration: {:?}", config);

    let document = load_document(&cli.input)?;
    if document.entities.is_empty() {
        bail!("query document declares no entities");
    }
    let registry = EntityRegistry::new();
    for entity in document.entities {
        registry.register(entity);
    }

    let translator = Translator::from_config(&config, Arc::new(CachedResolver::new(registry)));
    let translated = translator
        .translate(&document.query)
        .context("translating query")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&translated)?);
    } else {
        println!("{}", translated.sql);
        for (name, value) in translated.parameters.iter() {
            println!("  {}{} = {}", translator.dialect().parameter_prefix, name, value);
        }
    }
    Ok(())
}
