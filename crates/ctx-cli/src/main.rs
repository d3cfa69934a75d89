#![deny(unsafe_code)]

//! ctx CLI: streams directory trees and file contents in one pass.

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use ctx_config::{AppConfig, CommandKind, InitTarget, StreamOverrides, StreamSettings};
use ctx_core::build_info;
use ctx_core::{
    EntryClassifier, EventSession, IgnoreOptions, IgnoreResolver, OutputFormat, RenderMode,
    RenderOptions, TiktokenCounter, TokenCounter, TraversalEngine, TraversalOptions,
    build_renderer, resolve_roots,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// ctx: directory trees and file contents for prompts and tooling.
#[derive(Parser)]
#[command(name = "ctx", version = build_info::LONG_VERSION, about, long_about = None)]
struct Cli {
    /// Configuration file used instead of ./ctx.toml.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the directory tree.
    #[command(visible_alias = "t")]
    Tree(StreamArgs),

    /// Stream the tree together with file contents.
    #[command(visible_alias = "c")]
    Content(StreamArgs),

    /// Validate, display or initialize configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,

        /// Write the default configuration file.
        #[arg(
            long,
            value_enum,
            num_args = 0..=1,
            default_missing_value = "local",
            conflicts_with = "show"
        )]
        init: Option<InitScope>,

        /// Overwrite an existing file with --init.
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InitScope {
    /// ./ctx.toml
    Local,
    /// The per-user configuration directory.
    Global,
}

impl From<InitScope> for InitTarget {
    fn from(scope: InitScope) -> Self {
        match scope {
            InitScope::Local => InitTarget::Local,
            InitScope::Global => InitTarget::Global,
        }
    }
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Files or directories to scan (default: current directory).
    paths: Vec<String>,

    /// Exclude root-level entries matching a name or glob (repeatable).
    #[arg(short, long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Do not apply .gitignore rules.
    #[arg(long)]
    no_gitignore: bool,

    /// Do not apply .ignore rules.
    #[arg(long)]
    no_ignore: bool,

    /// Include the .git directory.
    #[arg(long)]
    git: bool,

    /// Output format: toon, raw, json or xml.
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Emit summary fields.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    summary: Option<bool>,

    /// Include file contents.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    content: Option<bool>,

    /// Count tokens for text files.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    tokens: Option<bool>,

    /// Tokenizer model.
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,
}

impl StreamArgs {
    fn overrides(&self) -> StreamOverrides {
        StreamOverrides {
            format: self.format.clone(),
            summary: self.summary,
            content: self.content,
            tokens: self.tokens,
            model: self.model.clone(),
            exclude: self.exclude.clone(),
            no_gitignore: self.no_gitignore,
            no_ignore: self.no_ignore,
            include_git: self.git,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let loaded = AppConfig::load_layered(&cwd, cli.config.as_deref()).await;

    let configured = match &loaded {
        Ok(config) => config.log_level(),
        Err(_) => ctx_config::default_log_level(),
    };
    init_tracing(cli.verbose, &configured);

    match cli.command {
        Commands::Tree(args) => cmd_stream(&loaded?, CommandKind::Tree, &args).await,
        Commands::Content(args) => cmd_stream(&loaded?, CommandKind::Content, &args).await,
        Commands::Config {
            init: Some(scope),
            force,
            ..
        } => cmd_init(scope.into(), &cwd, force).await,
        Commands::Config { show, .. } => cmd_config(&loaded?, show),
    }
}

/// `RUST_LOG` wins; otherwise each `-v` raises the configured level a step.
fn init_tracing(verbose: u8, configured: &str) {
    let filter = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();
}

async fn cmd_stream(config: &AppConfig, kind: CommandKind, args: &StreamArgs) -> Result<()> {
    let settings = config.stream_settings(kind, args.overrides())?;
    let format: OutputFormat = settings.format.parse()?;
    let roots = resolve_roots(&args.paths)?;
    let engine = build_engine(&settings)?;

    let options = RenderOptions {
        mode: if settings.content {
            RenderMode::Content
        } else {
            RenderMode::Tree
        },
        include_summary: settings.summary,
    };
    info!(command = kind.as_str(), %format, roots = roots.len(), "streaming");

    let renderer = build_renderer(format, options, BufWriter::new(io::stdout()), io::stderr());
    let (_, outcome) = EventSession::new(settings.channel_capacity)
        .run(Arc::new(engine), roots, renderer)
        .await?;
    debug!(
        files = outcome.files,
        directories = outcome.directories,
        warnings = outcome.warnings,
        peak_depth = outcome.peak_depth,
        "stream complete"
    );
    Ok(())
}

fn build_engine(settings: &StreamSettings) -> Result<TraversalEngine> {
    let resolver = IgnoreResolver::new(IgnoreOptions {
        use_ignore_file: settings.use_ignore,
        use_gitignore: settings.use_gitignore,
        include_git: settings.include_git,
        exclusions: settings.exclude.clone(),
    })?;
    let counter: Option<Arc<dyn TokenCounter>> = if settings.tokens {
        Some(Arc::new(TiktokenCounter::new(&settings.model)?))
    } else {
        None
    };
    Ok(TraversalEngine::new(
        resolver,
        EntryClassifier::new(settings.sniff_bytes),
        counter,
        TraversalOptions {
            include_content: settings.content,
            chunk_size: settings.chunk_size,
        },
    ))
}

fn cmd_config(config: &AppConfig, show: bool) -> Result<()> {
    if show {
        print!("{}", config.effective().to_toml()?);
    } else {
        println!("Configuration is valid.");
    }
    Ok(())
}

async fn cmd_init(target: InitTarget, cwd: &Path, force: bool) -> Result<()> {
    let path = ctx_config::init_config(target, cwd, force).await?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bool_flags_take_optional_values() {
        let cli = Cli::parse_from(["ctx", "tree", "--summary=false", "--tokens", "src", "docs"]);
        let Commands::Tree(args) = cli.command else {
            panic!("expected tree");
        };
        assert_eq!(args.summary, Some(false));
        assert_eq!(args.tokens, Some(true));
        assert_eq!(args.content, None);
        assert_eq!(args.paths, vec!["src".to_string(), "docs".to_string()]);
    }

    #[test]
    fn test_aliases_and_global_flags() {
        let cli = Cli::parse_from(["ctx", "c", "-e", "dist", "-e", "target", "--git", "-vv"]);
        assert_eq!(cli.verbose, 2);
        let Commands::Content(args) = cli.command else {
            panic!("expected content");
        };
        let overrides = args.overrides();
        assert_eq!(overrides.exclude, vec!["dist".to_string(), "target".to_string()]);
        assert!(overrides.include_git);
        assert!(!overrides.no_gitignore);
    }

    #[test]
    fn test_init_defaults_to_local() {
        let cli = Cli::parse_from(["ctx", "config", "--init"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                init: Some(InitScope::Local),
                force: false,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["ctx", "config", "--force"]).is_err());
        assert!(Cli::try_parse_from(["ctx", "config", "--init", "--show"]).is_err());
    }
}
