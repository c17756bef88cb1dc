use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::executor::types::HttpMethod;
use crate::executor::{Interpreter, Module, Request, Value};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - run routes, commands and tests of a parsed module", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one request through the module's routes
    Run {
        /// Module AST (JSON)
        module: PathBuf,

        /// Method and path, e.g. "GET /users/1"
        #[arg(long)]
        route: String,

        /// Request body (JSON string)
        #[arg(long)]
        body: Option<String>,

        /// Request header as key=value (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(long = "query")]
        query: Vec<String>,
    },

    /// Call a function with positional JSON arguments
    Call {
        /// Module AST (JSON)
        module: PathBuf,

        /// Function name
        function: String,

        /// Arguments (JSON strings)
        args: Vec<String>,
    },

    /// Run a command with named JSON arguments
    Command {
        /// Module AST (JSON)
        module: PathBuf,

        /// Command name
        name: String,

        /// Argument as key=JSON (repeatable)
        #[arg(long = "arg")]
        args: Vec<String>,
    },

    /// Run the module's test blocks
    Test {
        /// Module AST (JSON)
        module: PathBuf,

        /// Only run tests matching this pattern (`*` wildcards)
        #[arg(short = 'f', long = "filter")]
        filter: Option<String>,
    },

    /// Load and validate a module without running anything
    Check {
        /// Module AST (JSON)
        module: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

/// Load the configuration the CLI runs with
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Config::builder()
        .config_path(path)
        .build()
        .context("Failed to load configuration")
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load eagerly so config errors surface before any command output
    let config = load_config(cli.config.clone())?;
    run(cli.command, config).await
}

/// Execute one parsed command with an already loaded configuration
pub async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run {
            module,
            route,
            body,
            headers,
            query,
        } => {
            let interpreter = load_interpreter(&config, &module)?;
            let request = build_request(&route, body.as_deref(), &headers, &query)?;
            let response =
                tokio::task::spawn_blocking(move || interpreter.handle_request(request)).await?;

            let output = json!({
                "status": response.status,
                "headers": response.headers,
                "body": response.body,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            if !response.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Call {
            module,
            function,
            args,
        } => {
            let interpreter = load_interpreter(&config, &module)?;
            let args = args
                .iter()
                .map(|raw| parse_json_arg(raw))
                .collect::<Result<Vec<_>>>()?;
            let result =
                tokio::task::spawn_blocking(move || interpreter.call_function(&function, args))
                    .await?
                    .context("Function call failed")?;
            println!("{}", serde_json::to_string_pretty(&result.to_json())?);
        }

        Commands::Command { module, name, args } => {
            let interpreter = load_interpreter(&config, &module)?;
            let mut named = IndexMap::new();
            for raw in &args {
                let (key, value) = split_pair(raw)?;
                named.insert(key.to_string(), parse_json_arg(value)?);
            }
            let result =
                tokio::task::spawn_blocking(move || interpreter.execute_command(&name, named))
                    .await?
                    .context("Command failed")?;
            println!("{}", serde_json::to_string_pretty(&result.to_json())?);
        }

        Commands::Test { module, filter } => {
            let interpreter = load_interpreter(&config, &module)?;
            let results =
                tokio::task::spawn_blocking(move || interpreter.run_tests(filter.as_deref()))
                    .await?;

            let mut failed = 0;
            for result in &results {
                match &result.error {
                    None => println!("  ✓ {} ({:?})", result.name, result.duration),
                    Some(err) => {
                        failed += 1;
                        let label = if result.is_assertion_failure() {
                            "assertion"
                        } else {
                            err.kind()
                        };
                        println!("  ✗ {} [{}]: {}", result.name, label, err);
                    }
                }
            }
            println!(
                "\n{} passed, {} failed, {} total",
                results.len() - failed,
                failed,
                results.len()
            );
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Check { module } => {
            let interpreter = load_interpreter(&config, &module)?;
            println!(
                "✓ {} is valid ({} routes, {} tests)",
                module.display(),
                interpreter.routes().len(),
                interpreter.tests().len()
            );
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn read_module(path: &Path) -> Result<Module> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read module {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("Invalid module AST in {}", path.display()))
}

fn load_interpreter(config: &Config, path: &Path) -> Result<Interpreter> {
    let module = read_module(path)?;
    let mut interpreter = Interpreter::with_config(config);
    interpreter
        .load_module(module)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok(interpreter)
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .ok_or_else(|| anyhow!("Expected key=value, got '{}'", raw))
}

/// JSON when it parses, otherwise the raw text as a string
fn parse_json_arg(raw: &str) -> Result<Value> {
    Ok(match serde_json::from_str(raw) {
        Ok(json) => Value::from_json(json),
        Err(_) => Value::Str(raw.to_string()),
    })
}

fn build_request(route: &str, body: Option<&str>, headers: &[String], query: &[String]) -> Result<Request> {
    let (method, path) = route
        .trim()
        .split_once(' ')
        .ok_or_else(|| anyhow!("Expected \"METHOD /path\", got '{}'", route))?;
    let method: HttpMethod = method.parse().map_err(|e: String| anyhow!(e))?;

    let mut request = Request::new(method, path.trim());
    if let Some(body) = body {
        request = request.with_body(serde_json::from_str(body).context("Invalid request body JSON")?);
    }
    for raw in headers {
        let (key, value) = split_pair(raw)?;
        request = request.with_header(key, value);
    }
    for raw in query {
        let (key, value) = split_pair(raw)?;
        request = request.with_param(key, value);
    }
    Ok(request)
}
