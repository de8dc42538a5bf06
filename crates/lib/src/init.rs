//! Initialize the configuration directory: create ~/.faqrelay, a default config and the bundled catalog.
//!
//! Layout mirrors `crates/lib/config/`: `config/catalog.yaml` → `~/.faqrelay/catalog.yaml`.

use anyhow::{Context, Result};
use include_dir::{include_dir, Dir};
use std::path::{Path, PathBuf};

use crate::config::Config;

static BUNDLED_CONFIG: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/config");

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every default spelled out if missing.
/// - Extracts each bundled file (the FAQ catalog) that is not already present.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    for file in BUNDLED_CONFIG.files() {
        let target = config_dir.join(file.path());
        if target.exists() {
            log::debug!("{} already exists, skipping", target.display());
            continue;
        }
        std::fs::write(&target, file.contents())
            .with_context(|| format!("writing {}", target.display()))?;
        log::info!("wrote {}", target.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::load_config;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("faqrelay-init-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn init_writes_loadable_config_and_catalog() {
        let dir = temp_dir();
        let config_path = dir.join("config.json");
        let out = init_config_dir(&config_path).unwrap();
        assert_eq!(out, dir);

        let (config, _) = load_config(Some(config_path.clone())).unwrap();
        assert_eq!(config.gateway.port, 15152);
        let catalog = Catalog::load(&dir.join("catalog.yaml")).unwrap();
        assert_eq!(catalog.categories().len(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn init_keeps_existing_files() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.json");
        std::fs::write(&config_path, r#"{"gateway":{"port":9000}}"#).unwrap();
        std::fs::write(
            dir.join("catalog.yaml"),
            "categories:\n  - name: Only\n    questions: []\n",
        )
        .unwrap();

        init_config_dir(&config_path).unwrap();

        let (config, _) = load_config(Some(config_path)).unwrap();
        assert_eq!(config.gateway.port, 9000);
        let catalog = Catalog::load(&dir.join("catalog.yaml")).unwrap();
        assert_eq!(catalog.categories().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
