// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/sqlactor/sqlactor.toml`,
//! `$XDG_CONFIG_HOME/sqlactor/sqlactor.toml`, `./sqlactor.toml`, then
//! `SQLACTOR_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SqlActorConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sqlactor/sqlactor.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "sqlactor.toml";

/// Per-user config file under the XDG config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sqlactor").join(LOCAL_CONFIG_FILE))
}

/// Every file location consulted by [`load_config`], lowest priority first.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    paths.extend(user_config_path());
    paths.push(PathBuf::from(LOCAL_CONFIG_FILE));
    paths
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(SqlActorConfig::default()));
    for path in config_search_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Load configuration from the standard file hierarchy and the environment.
pub fn load_config() -> Result<SqlActorConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from one explicit file, still honouring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<SqlActorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SqlActorConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string only.
pub fn load_config_from_str(toml_content: &str) -> Result<SqlActorConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SqlActorConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// `SQLACTOR_<SECTION>_<KEY>` maps to `<section>.<key>`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `SQLACTOR_CONNECTION_ITER_CHUNK_SIZE` lands on `connection.iter_chunk_size`.
fn env_provider() -> Env {
    Env::prefixed("SQLACTOR_").map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        ["connection", "log"]
            .iter()
            .find_map(|section| {
                key.strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|field| format!("{section}.{field}"))
            })
            .unwrap_or(key)
            .into()
    })
}
