use std::path::{Path, PathBuf};

use anyhow::Context;
use progress_core::catalog::{CatalogCounts, StaticCatalog};
use progress_core::model::{RoleId, UserId, YearId};
use serde::Deserialize;
use server::StaticTokens;

/// Contents of `progress.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tokens: Vec<TokenEntry>,
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://progress.db".into(),
            max_connections: 5,
        }
    }
}

/// Bearer token accepted for one user.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
}

/// Item counts for one (role, year) of the roadmap.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub role_id: String,
    pub year_id: String,
    #[serde(default)]
    pub skills: u32,
    #[serde(default)]
    pub projects: u32,
    #[serde(default)]
    pub free_resources: u32,
    #[serde(default)]
    pub paid_resources: u32,
}

impl AppConfig {
    /// Read `path`, or return defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error for malformed TOML.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// # Errors
    ///
    /// Returns an error for an empty token or an invalid user id.
    pub fn static_tokens(&self) -> anyhow::Result<StaticTokens> {
        self.tokens
            .iter()
            .map(|entry| {
                let token = entry.token.trim();
                anyhow::ensure!(!token.is_empty(), "token for user {:?} is empty", entry.user_id);
                let user_id = UserId::new(entry.user_id.as_str())
                    .with_context(|| format!("invalid user id {:?}", entry.user_id))?;
                Ok((token.to_string(), user_id))
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error for an invalid role or year id.
    pub fn static_catalog(&self) -> anyhow::Result<StaticCatalog> {
        self.catalog
            .iter()
            .map(|entry| {
                let role_id = RoleId::new(entry.role_id.as_str())
                    .with_context(|| format!("invalid role id {:?}", entry.role_id))?;
                let year_id = YearId::new(entry.year_id.as_str())
                    .with_context(|| format!("invalid year id {:?}", entry.year_id))?;
                let counts = CatalogCounts::new(
                    entry.skills,
                    entry.projects,
                    entry.free_resources,
                    entry.paid_resources,
                );
                Ok((role_id, year_id, counts))
            })
            .collect()
    }
}

/// Turn a bare or relative path into an absolute `sqlite://` url.
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the parent directory of a file-backed database.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn prepare_sqlite_dir(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = Path::new(path.split('?').next().unwrap_or(path));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use progress_core::catalog::Catalog;
    use server::Authenticator;

    use super::*;

    const SAMPLE: &str = r#"
[server]
bind = "0.0.0.0:9000"

[database]
url = "sqlite:///var/lib/progress/progress.db"

[[tokens]]
token = "alice-token"
user_id = "alice"

[[catalog]]
role_id = "frontend"
year_id = "0-1"
skills = 5
projects = 2
free_resources = 3
paid_resources = 1
"#;

    #[test]
    fn parses_every_section() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.database.max_connections, 5);

        let tokens = config.static_tokens().unwrap();
        assert_eq!(tokens.authenticate("alice-token").unwrap().as_str(), "alice");
        assert!(tokens.authenticate("other").is_none());

        let catalog = config.static_catalog().unwrap();
        let counts = catalog.counts(&RoleId::new("frontend").unwrap(), &YearId::new("0-1").unwrap());
        assert_eq!(counts.total(), 11);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.database.url, "sqlite://progress.db");
        assert!(config.tokens.is_empty());
    }

    #[test]
    fn load_reports_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.toml");
        std::fs::write(&path, "[server\nbind =").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn rejects_blank_ids_and_tokens() {
        let blank_user = AppConfig::parse("[[tokens]]\ntoken = \"t\"\nuser_id = \" \"\n").unwrap();
        assert!(blank_user.static_tokens().is_err());

        let blank_token = AppConfig::parse("[[tokens]]\ntoken = \"\"\nuser_id = \"alice\"\n").unwrap();
        assert!(blank_token.static_tokens().is_err());

        let blank_role = AppConfig::parse("[[catalog]]\nrole_id = \"\"\nyear_id = \"0-1\"\n").unwrap();
        assert!(blank_role.static_catalog().is_err());
    }

    #[test]
    fn normalizes_sqlite_urls() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite:///tmp/p.db"), "sqlite:///tmp/p.db");
        assert_eq!(normalize_sqlite_url("/tmp/p.db"), "sqlite:///tmp/p.db");
        assert!(normalize_sqlite_url("data/p.db").ends_with("/data/p.db"));
    }

    #[test]
    fn prepares_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("progress.db");
        prepare_sqlite_dir(&format!("sqlite://{}", db.display())).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
