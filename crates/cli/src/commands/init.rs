//! `tether init` — Write the default config and create the store.

use super::config_error;
use tether_config::AppConfig;
use tether_core::Result;

pub fn run() -> Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = std::env::var("TETHER_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| config_dir.join("config.toml"));

    println!("🧵 Tether — Setup");
    println!("=================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load().map_err(config_error)?;
    if config.storage.backend == "file" {
        let root = config.storage_root();
        std::fs::create_dir_all(&root)?;
        println!("✅ Storage root: {}", root.display());
    } else {
        println!("  Storage backend: {} (nothing to create)", config.storage.backend);
    }

    println!("\n🎉 Setup complete! Try `tether prompt --user me --input \"hello\"`.\n");

    Ok(())
}
