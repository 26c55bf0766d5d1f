//! Execbox CLI
//!
//! A command-line front end for running multi-file projects through the
//! execution dispatcher.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execbox::{
    Config, Dispatcher, EXAMPLE_CONFIG, ExecutionRequest, ExecutionResult, LanguageKind,
    SourceFiles,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "execbox")]
#[command(about = "A tool for dispatching multi-file code execution requests")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: execbox.toml)
        #[arg(short, long, default_value = "execbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a project made of one or more source files
    Run {
        /// Source files; each is submitted under its file name
        #[arg(value_name = "FILE", required_unless_present = "request")]
        files: Vec<PathBuf>,

        /// Read a complete JSON request instead of source files
        #[arg(short, long, conflicts_with_all = ["files", "entry"])]
        request: Option<PathBuf>,

        /// Language tag (python, javascript/js/node, bash/shell/sh)
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Entry point (default: stem of the first file)
        #[arg(short, long)]
        entry: Option<String>,

        /// Timeout in seconds for child-process languages
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Run a single snippet of source code
    Eval {
        /// Source code to run
        #[arg(value_name = "CODE")]
        code: String,

        /// Language tag (python, javascript/js/node, bash/shell/sh)
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Timeout in seconds for child-process languages
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// List recognized language tags
    Languages,

    /// Show the embedded interpreter's capability table
    Probe,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Logs go to stderr so stdout stays a clean JSON document
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            files,
            request,
            language,
            entry,
            timeout,
        } => {
            let request = match request {
                Some(path) => read_request(&path).await?,
                None => build_request(&files, language, entry).await?,
            };
            let dispatcher = Dispatcher::new(config);
            let result = dispatcher.execute_with_timeout(request, timeout).await;
            report(&result)
        }
        Commands::Eval {
            code,
            language,
            timeout,
        } => {
            let dispatcher = Dispatcher::new(config);
            let request = ExecutionRequest::single(code, language);
            let result = dispatcher.execute_with_timeout(request, timeout).await;
            report(&result)
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::Probe => show_capabilities(config),
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn read_request(path: &Path) -> Result<ExecutionRequest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read request file '{}'", path.display()))?;
    serde_json::from_str(&content).context("failed to parse request")
}

/// Submit each file under its file name; the entry point defaults to the
/// first file's stem
async fn build_request(
    paths: &[PathBuf],
    language: String,
    entry: Option<String>,
) -> Result<ExecutionRequest> {
    let mut files = SourceFiles::new();
    for path in paths {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("invalid file name '{}'", path.display()))?
            .to_owned();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read source file '{}'", path.display()))?;
        files.insert(name, content);
    }

    let entry = match entry {
        Some(entry) => entry,
        None => paths
            .first()
            .and_then(|path| path.file_stem())
            .and_then(|stem| stem.to_str())
            .context("no source files given")?
            .to_owned(),
    };

    Ok(ExecutionRequest::new(files, language, entry))
}

/// Print the result as JSON and exit non-zero on failure
fn report(result: &ExecutionResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result).context("failed to serialize result")?;
    println!("{json}");

    info!(
        success = result.success,
        time = format_args!("{:.3}s", result.execution_time),
        files = result.files_created.len(),
        "execution result"
    );

    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for kind in LanguageKind::ALL {
        println!(
            "  {:<12} {} (.{}; tags: {})",
            kind.as_str(),
            config.language_name(kind),
            config.extension(kind),
            kind.synonyms().join(", ")
        );
    }
}

fn show_capabilities(config: Config) -> Result<()> {
    let dispatcher = Dispatcher::new(config);
    let capabilities = dispatcher.capabilities();

    let table = serde_json::json!({
        "builtins": capabilities.builtin_names().collect::<Vec<_>>(),
        "modules": capabilities.module_names().collect::<Vec<_>>(),
        "missing": capabilities.missing(),
    });
    let json = serde_json::to_string_pretty(&table).context("failed to serialize capabilities")?;
    println!("{json}");
    Ok(())
}

fn show_config(config: &Config) {
    println!("Timeout: {:?}", config.timeout());
    match config.workspace_root() {
        Some(root) => println!("Workspace root: {}", root.display()),
        None => println!("Workspace root: {} (system temp)", std::env::temp_dir().display()),
    }
    println!();
    println!("{}:", config.python.name);
    println!("  Builtins: {}", config.python.builtins.len());
    println!("  Modules: {}", config.python.modules.join(", "));
    println!(
        "  Optional modules: {}",
        config
            .python
            .optional_modules
            .iter()
            .map(|optional| optional.module.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
    println!("{}:", config.javascript.name);
    println!("  Command: {}", config.javascript.run.command.join(" "));
    println!();
    println!("{}:", config.bash.name);
    println!("  Command: {}", config.bash.run.command.join(" "));
    println!("  Denylist: {} tokens", config.bash.denylist.len());
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
