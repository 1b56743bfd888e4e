//! Command-line interface for blockpad.

/// Clap argument definitions
mod args;

/// `init` and `config` command handlers
mod config;

/// `write`, `import`, `export` and the text format they share
mod content;

/// Page management
mod page;

/// `status` command handler
mod status;

use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use blockpad_core::config::Config;
use blockpad_core::error::{BlockpadError, Result};
use blockpad_core::scheduler::TokioScheduler;
use blockpad_core::session::EditorSession;
use blockpad_core::storage::{BlockStorage, open_storage};
use tokio::runtime::Runtime;

use args::{Cli, Commands};

/// Everything a command handler needs: the loaded config and a runtime.
pub struct CliContext {
    runtime: Runtime,
    config: Config,
    config_path: Option<PathBuf>,
}

impl CliContext {
    /// Load the config from `config_path` (or the default location).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = match &config_path {
            Some(path) if path.exists() => Config::load_from(path)?,
            Some(_) => Config::default(),
            None => Config::load()?,
        };
        log::debug!(
            "Using {} storage backend",
            config.storage.backend_name()
        );
        Self::with_config(config, config_path)
    }

    pub fn with_config(config: Config, config_path: Option<PathBuf>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            runtime,
            config,
            config_path: config_path.or_else(Config::config_path),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }

    /// Run a future to completion on the CLI runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn storage(&self) -> Result<Arc<dyn BlockStorage>> {
        open_storage(&self.config.storage)
    }

    /// A session with the page list loaded and no page active.
    pub fn session(&self) -> Result<EditorSession> {
        let storage = self.storage()?;
        let scheduler = Arc::new(TokioScheduler::new(self.runtime.handle().clone()));
        let mut session = EditorSession::new(storage, scheduler, self.config.autosave)
            .with_default_title(self.config.default_page_title.clone());
        self.block_on(session.reload_pages())?;
        Ok(session)
    }
}

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let success = match cli.command {
        Commands::Init {
            backend,
            data,
            debounce_ms,
        } => config::handle_init(cli.config, backend, data, debounce_ms),

        command => match CliContext::load(cli.config) {
            Ok(ctx) => run_command(&ctx, command),
            Err(e) => {
                eprintln!("✗ Error loading config: {}", e);
                false
            }
        },
    };

    if !success {
        std::process::exit(1);
    }
}

/// Dispatch a command that needs a loaded config.
/// Returns true on success, false on error
fn run_command(ctx: &CliContext, command: Commands) -> bool {
    match command {
        Commands::Init { .. } => unreachable!("init is handled before loading config"),
        Commands::Config => config::handle_show_config(ctx),
        Commands::Page { command } => page::handle_page_command(ctx, command),
        Commands::Write {
            page,
            block_type,
            text,
        } => content::handle_write(ctx, &page, block_type, &text),
        Commands::Import { page, file } => content::handle_import(ctx, &page, &file),
        Commands::Export { page } => content::handle_export(ctx, &page),
        Commands::Status => status::handle_status(ctx),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

/// Print an error in the CLI's format and return false.
fn report(context: &str, error: &BlockpadError) -> bool {
    eprintln!("✗ {}: {}", context, error);
    false
}
