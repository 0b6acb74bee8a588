//! Configuration loading and root folder resolution

use crate::scope::ScopeStrategy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Settings read from the optional TOML config file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tenant all stored records belong to
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
    /// "tenant-global" or "per-user"
    #[serde(default = "default_scope_strategy")]
    pub scope_strategy: String,
    /// Data directory; CLI and environment variable take precedence
    #[serde(default)]
    pub root_folder: Option<String>,
}

fn default_port() -> u16 {
    5730
}

fn default_tenant_id() -> String {
    "default-app-id".to_string()
}

fn default_scope_strategy() -> String {
    "tenant-global".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        TomlConfig {
            port: default_port(),
            tenant_id: default_tenant_id(),
            scope_strategy: default_scope_strategy(),
            root_folder: None,
        }
    }
}

impl TomlConfig {
    pub fn scope_strategy(&self) -> Result<ScopeStrategy> {
        self.scope_strategy.parse()
    }
}

/// Load the TOML config file, or defaults when none exists
pub fn load_config(explicit_path: Option<&str>) -> Result<TomlConfig> {
    let path = match explicit_path {
        Some(p) => {
            let p = PathBuf::from(p);
            if !p.exists() {
                return Err(Error::Config(format!("Config file not found: {:?}", p)));
            }
            Some(p)
        }
        None => find_config_file(),
    };

    match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Invalid config {:?}: {}", path, e)))
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable UCRIF_ROOT_FOLDER
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var("UCRIF_ROOT_FOLDER") {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(path) = config.root_folder.as_deref() {
        return PathBuf::from(path);
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Find the platform config file, if present
fn find_config_file() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        // ~/.config/ucrif/config.toml first, then /etc/ucrif/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("ucrif").join("config.toml")) {
            if path.exists() {
                return Some(path);
            }
        }
        let system_config = PathBuf::from("/etc/ucrif/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
        None
    } else {
        dirs::config_dir()
            .map(|d| d.join("ucrif").join("config.toml"))
            .filter(|p| p.exists())
    }
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/ucrif (or /var/lib/ucrif for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("ucrif"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/ucrif"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("ucrif"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ucrif"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("ucrif"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ucrif"))
    } else {
        PathBuf::from("./ucrif_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5730);
        assert_eq!(config.tenant_id, "default-app-id");
        assert_eq!(
            config.scope_strategy().unwrap(),
            ScopeStrategy::TenantGlobal
        );
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000
            tenant_id = "ucrif-prod"
            scope_strategy = "per-user"
            root_folder = "/srv/ucrif"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.tenant_id, "ucrif-prod");
        assert_eq!(config.scope_strategy().unwrap(), ScopeStrategy::PerUser);
        assert_eq!(config.root_folder.as_deref(), Some("/srv/ucrif"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TomlConfig = toml::from_str("port = 8080").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.tenant_id, "default-app-id");
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let config: TomlConfig = toml::from_str(r#"scope_strategy = "shared""#).unwrap();
        assert!(config.scope_strategy().is_err());
    }

    #[test]
    fn test_cli_arg_wins() {
        let config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..TomlConfig::default()
        };
        let root = resolve_root_folder(Some("/from/cli"), &config);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_toml_used_when_no_cli() {
        let config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..TomlConfig::default()
        };
        // Environment variable may shadow the TOML value in a dev shell;
        // only assert when it is unset.
        if std::env::var("UCRIF_ROOT_FOLDER").is_err() {
            let root = resolve_root_folder(None, &config);
            assert_eq!(root, PathBuf::from("/from/toml"));
        }
    }
}
