// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for sqlactor.
//!
//! TOML files and `SQLACTOR_*` environment variables are merged with Figment,
//! validated, and reported as miette diagnostics with typo suggestions.
//!
//! ```no_run
//! let config = sqlactor_config::load_and_validate().expect("config errors");
//! println!("database: {}", config.connection.database);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{ConnectionConfig, LogConfig, SqlActorConfig};

/// Load configuration from the standard locations and validate it.
pub fn load_and_validate() -> Result<SqlActorConfig, Vec<ConfigError>> {
    finish(loader::load_config(), read_sources(&loader::config_search_paths()))
}

/// Load configuration from one file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<SqlActorConfig, Vec<ConfigError>> {
    finish(
        loader::load_config_from_path(path),
        read_sources(&[path.to_path_buf()]),
    )
}

/// Load configuration from an inline TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<SqlActorConfig, Vec<ConfigError>> {
    finish(
        loader::load_config_from_str(toml_content),
        vec![("<inline>".to_string(), toml_content.to_string())],
    )
}

fn finish(
    loaded: Result<SqlActorConfig, figment::Error>,
    sources: Vec<(String, String)>,
) -> Result<SqlActorConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            tracing::debug!(database = %config.connection.database, "configuration loaded");
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources)),
    }
}

/// Contents of the config files that exist, keyed by the path Figment reports.
fn read_sources(paths: &[std::path::PathBuf]) -> Vec<(String, String)> {
    paths
        .iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(path).ok()?;
            let shown = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            Some((shown.display().to_string(), content))
        })
        .collect()
}
