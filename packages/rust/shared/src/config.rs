//! Application configuration for bundleworks.
//!
//! Config lives at `./bundleworks.toml` or `~/.bundleworks/bundleworks.toml`
//! (first match wins). Read once at startup; not hot-reloaded.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BundleworksError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bundleworks.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bundleworks";

// ---------------------------------------------------------------------------
// Config structs (matching bundleworks.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public base URL the published artifacts are served under.
    #[serde(default = "default_http_base_url")]
    pub http_base_url: String,

    /// Path of the sqlite ledger database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Root directory for published artifacts and temporary build dirs.
    /// Must exist before the process starts.
    pub storage_path: String,

    /// Source-control API settings.
    #[serde(default)]
    pub scm: ScmConfig,

    /// Build queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Buildable projects.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_base_url: default_http_base_url(),
            db_path: default_db_path(),
            storage_path: String::new(),
            scm: ScmConfig::default(),
            queue: QueueConfig::default(),
            projects: Vec::new(),
        }
    }
}

fn default_http_base_url() -> String {
    "http://localhost:3433".into()
}
fn default_db_path() -> String {
    "bundleworks.db".into()
}

/// `[scm]` section — the source-control host builds are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmConfig {
    /// Base URL of the GitLab instance.
    #[serde(default = "default_scm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for ScmConfig {
    fn default() -> Self {
        Self {
            base_url: default_scm_base_url(),
            token_env: default_token_env(),
        }
    }
}

fn default_scm_base_url() -> String {
    "https://gitlab.com".into()
}
fn default_token_env() -> String {
    "BUNDLEWORKS_SCM_TOKEN".into()
}

impl ScmConfig {
    /// Read the API token from the configured environment variable.
    pub fn resolve_token(&self) -> Result<String> {
        match std::env::var(&self.token_env) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(BundleworksError::config(format!(
                "source-control token not found, set the {} environment variable",
                self.token_env
            ))),
        }
    }
}

/// `[queue]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Seconds between drain cycles.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Maximum builds started per drain cycle (and thus running concurrently).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_tick_seconds() -> u64 {
    5
}
fn default_batch_size() -> usize {
    5
}

/// `[[projects]]` entry — one buildable source-control project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project identifier on the source-control host.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Branch whitelist. Empty means every branch is allowed.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Shell commands run in order inside the fresh clone.
    #[serde(default)]
    pub build_commands: Vec<String>,
    /// Glob patterns selecting the files to publish after a build.
    #[serde(default)]
    pub dist_files: Vec<String>,
}

impl ProjectConfig {
    /// Whether the whitelist admits `branch`. An empty whitelist admits all.
    pub fn allows_branch(&self, branch: &str) -> bool {
        self.branches.is_empty() || self.branches.iter().any(|b| b == branch)
    }
}

impl AppConfig {
    /// Look up a configured project by its identifier.
    pub fn find_project(&self, project_id: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.id == project_id)
    }

    /// Validate startup-fatal settings: base URL shape and storage path.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.http_base_url).map_err(|e| {
            BundleworksError::config(format!("invalid http_base_url {}: {e}", self.http_base_url))
        })?;

        if self.storage_path.is_empty() {
            return Err(BundleworksError::config("storage_path is not set"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bundleworks/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BundleworksError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Candidate config file locations, in search order.
pub fn config_places() -> Result<Vec<PathBuf>> {
    Ok(vec![
        PathBuf::from(CONFIG_FILE_NAME),
        config_dir()?.join(CONFIG_FILE_NAME),
    ])
}

/// Load the application config from the first existing candidate location.
pub fn load_config() -> Result<AppConfig> {
    for path in config_places()? {
        if path.exists() {
            return load_config_from(&path);
        }
    }

    Err(BundleworksError::config(format!(
        "no {CONFIG_FILE_NAME} found, run `bundleworks init` to create a template"
    )))
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BundleworksError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BundleworksError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a template config file at `./bundleworks.toml` for the operator to
/// fill in. Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = PathBuf::from(CONFIG_FILE_NAME);
    let template = AppConfig {
        storage_path: "/var/lib/bundleworks".into(),
        projects: vec![ProjectConfig {
            id: "42".into(),
            name: "example-widget".into(),
            branches: vec!["main".into()],
            build_commands: vec!["npm ci".into(), "npm run build".into()],
            dist_files: vec!["dist/**".into()],
        }],
        ..AppConfig::default()
    };

    let content =
        toml::to_string_pretty(&template).map_err(|e| BundleworksError::config(e.to_string()))?;
    std::fs::write(&path, content).map_err(|e| BundleworksError::io(&path, e))?;
    tracing::info!(?path, "created template config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("http_base_url"));
        assert!(toml_str.contains("BUNDLEWORKS_SCM_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let toml_str = r#"
http_base_url = "http://cdn.internal:3433"
db_path = "/var/lib/bundleworks/ledger.db"
storage_path = "/var/lib/bundleworks"

[scm]
base_url = "https://gitlab.internal"

[queue]
tick_seconds = 2
batch_size = 3

[[projects]]
id = "7"
name = "checkout-widget"
branches = ["main", "develop"]
build_commands = ["npm ci", "npm run build"]
dist_files = ["dist/**"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.queue.batch_size, 3);
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.projects[0].dist_files, vec!["dist/**"]);
        config.validate().expect("valid config");
    }

    #[test]
    fn queue_defaults_apply() {
        let config: AppConfig = toml::from_str(r#"storage_path = "/tmp""#).expect("parse");
        assert_eq!(config.queue.tick_seconds, 5);
        assert_eq!(config.queue.batch_size, 5);
    }

    #[test]
    fn branch_whitelist() {
        let project = ProjectConfig {
            id: "1".into(),
            name: "p".into(),
            branches: vec!["main".into()],
            build_commands: vec![],
            dist_files: vec![],
        };
        assert!(project.allows_branch("main"));
        assert!(!project.allows_branch("feature-x"));

        let open = ProjectConfig {
            branches: vec![],
            ..project
        };
        assert!(open.allows_branch("feature-x"));
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let config = AppConfig {
            http_base_url: "not a url".into(),
            storage_path: "/tmp".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_token_env_is_config_error() {
        let scm = ScmConfig {
            base_url: "https://gitlab.com".into(),
            token_env: "BW_TEST_NONEXISTENT_TOKEN_93121".into(),
        };
        let result = scm.resolve_token();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }
}
