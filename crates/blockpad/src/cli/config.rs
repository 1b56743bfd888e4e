//! Config command handlers

use std::path::PathBuf;

use blockpad_core::config::{Config, StorageConfig};

use crate::cli::CliContext;
use crate::cli::args::Backend;

/// Handle the init command
/// Returns true on success, false on error
pub fn handle_init(
    config_override: Option<PathBuf>,
    backend: Backend,
    data: Option<PathBuf>,
    debounce_ms: Option<u64>,
) -> bool {
    let Some(config_path) = config_override.or_else(Config::config_path) else {
        eprintln!("✗ Could not determine a config directory; pass --config");
        return false;
    };

    let config = build_config(backend, data, debounce_ms);
    if let Err(e) = config.save_to(&config_path) {
        eprintln!("✗ Error initializing config: {}", e);
        return false;
    }

    println!("✓ Initialized blockpad configuration");
    println!("  Backend: {}", config.storage.backend_name());
    match &config.storage {
        StorageConfig::Memory => println!("  Data: (in memory, not persisted)"),
        StorageConfig::Json { dir } => println!("  Data directory: {}", dir.display()),
        StorageConfig::Sqlite { path } => println!("  Database: {}", path.display()),
    }
    println!("  Config file: {}", config_path.display());
    true
}

fn build_config(backend: Backend, data: Option<PathBuf>, debounce_ms: Option<u64>) -> Config {
    let data_dir = || {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blockpad")
    };

    let storage = match backend {
        Backend::Memory => StorageConfig::Memory,
        Backend::Json => StorageConfig::Json {
            dir: data.unwrap_or_else(data_dir),
        },
        Backend::Sqlite => StorageConfig::Sqlite {
            path: data.unwrap_or_else(|| data_dir().join("blockpad.db")),
        },
    };

    let mut config = Config::new(storage);
    if let Some(debounce_ms) = debounce_ms {
        config.autosave.debounce_ms = debounce_ms;
    }
    config
}

/// Show the effective configuration
pub fn handle_show_config(ctx: &CliContext) -> bool {
    let config = ctx.config();
    println!("Blockpad Configuration");
    println!("======================");
    println!("Backend: {}", config.storage.backend_name());
    match &config.storage {
        StorageConfig::Memory => {}
        StorageConfig::Json { dir } => println!("Data directory: {}", dir.display()),
        StorageConfig::Sqlite { path } => println!("Database: {}", path.display()),
    }
    println!("Default page title: {}", config.default_page_title);
    println!("Autosave debounce: {} ms", config.autosave.debounce_ms);
    println!(
        "Save retries: {} (backoff {} ms)",
        config.autosave.max_retries, config.autosave.retry_backoff_ms
    );
    match ctx.config_path() {
        Some(path) if path.exists() => println!("Config file: {}", path.display()),
        Some(path) => println!("Config file: {} (not created, using defaults)", path.display()),
        None => println!("Config file: (none)"),
    }
    true
}
