use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, ZliError};
use crate::kube::security::KubeDaemonSecurityConfig;

/// The logged-in identity, written by the login flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub email: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// One kind's daemon registry as stored on disk, keyed by storage key.
///
/// Entries stay untyped here so a malformed entry of one kind never makes the
/// whole file unreadable; [`crate::daemon::ConfigDaemonStore`] parses them.
pub type RawRegistry = Map<String, Value>;

/// Contents of the user-scoped CLI config file shared by every invocation.
///
/// Keys owned by other parts of the CLI (tokens, service urls, ...) are kept
/// in `other` so that writing this struct back never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whoami: Option<Subject>,
    #[serde(default)]
    pub db_daemons: RawRegistry,
    #[serde(default)]
    pub kube_daemons: RawRegistry,
    #[serde(default)]
    pub web_daemons: RawRegistry,
    #[serde(default)]
    pub shell_daemons: RawRegistry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_daemon_security_config: Option<KubeDaemonSecurityConfig>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Write `contents` to a sibling temp file and rename it over `path`, so
/// readers never see a partial file. `private` files are created 0600.
pub(crate) fn write_atomic(path: &Path, contents: impl AsRef<[u8]>, private: bool) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        if private {
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        if private {
            // mode() only applies on create; a leftover temp file keeps its bits.
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents.as_ref())?;
        file.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = private;
        let mut file = options.open(&tmp)?;
        file.write_all(contents.as_ref())?;
        file.sync_all()?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Handle on the CLI config file.
///
/// Every accessor reads the whole file and every mutation rewrites it.
/// Concurrent invocations race with last-writer-wins semantics.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Config file resolved from the environment ($ZLI_CONFIG_DIR, $ZLI_CONFIG_NAME)
    pub fn from_env() -> Self {
        Self::new(crate::clienv::config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the config file; generated artifacts live next to it.
    pub fn config_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn load(&self) -> Result<CliConfig> {
        tracing::trace!(path = %self.path.display(), "Loading CLI config");

        if !self.path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(CliConfig::default());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(CliConfig::default());
        }

        serde_json::from_str(&content).map_err(|e| {
            ZliError::Config(format!(
                "failed to parse config from {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    pub fn save(&self, config: &CliConfig) -> Result<()> {
        tracing::trace!(path = %self.path.display(), "Saving CLI config");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        write_atomic(&self.path, content, false)?;

        tracing::trace!("CLI config saved");
        Ok(())
    }

    /// Read the whole file, apply `f`, write the whole file back.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut CliConfig),
    {
        let mut config = self.load()?;
        f(&mut config);
        self.save(&config)
    }

    /// The logged-in subject.
    pub fn me(&self) -> Result<Subject> {
        self.load()?
            .whoami
            .ok_or_else(|| ZliError::NotLoggedIn(self.path.display().to_string()))
    }

    pub fn kube_daemon_security_config(&self) -> Result<Option<KubeDaemonSecurityConfig>> {
        Ok(self.load()?.kube_daemon_security_config)
    }

    pub fn set_kube_daemon_security_config(&self, settings: KubeDaemonSecurityConfig) -> Result<()> {
        self.update(|config| config.kube_daemon_security_config = Some(settings))
    }
}
