use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use desk_state::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_THEME};

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    port = 4000
//
//   env var:         DESK_SERVER__PORT=4000   (double underscore = nesting)
//
//   (single underscore stays within field names: DESK_DESKTOP__DEFAULT_THEME)

/// Named configuration presets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// host=127.0.0.1
    Local,
    /// host=0.0.0.0, reachable from other machines on the network
    Lan,
}

/// Where saved file content goes.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per saved name under `files_dir`
    #[default]
    Fs,
    /// Kept in process memory, lost on exit
    Memory,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub desktop: DesktopFileConfig,
    #[serde(default)]
    pub storage: StorageFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
}

/// Listener settings (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Desktop defaults (lives under `[desktop]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DesktopFileConfig {
    #[serde(default = "default_theme")]
    pub default_theme: String,
}

impl Default for DesktopFileConfig {
    fn default() -> Self {
        Self {
            default_theme: default_theme(),
        }
    }
}

/// Blob storage for saved files (lives under `[storage]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageFileConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Defaults to `<data_dir>/files`
    #[serde(default)]
    pub files_dir: Option<PathBuf>,
}

/// Subscriber tuning (lives under `[websocket]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}
fn default_send_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Build a figment that layers: defaults → profile defaults → config.toml → DESK_* env vars.
///
/// The CLI profile takes priority over the config file profile.
///
/// Env vars use double-underscore for nesting into sections:
///   `DESK_SERVER__PORT=4000`  →  `server.port = 4000`
///   `DESK_STORAGE__BACKEND=memory`  →  `storage.backend = "memory"`
pub fn load_config(data_dir: &Path, cli_profile: Option<&Profile>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    // Pass 1: peek at profile from config.toml/env (CLI overrides file)
    let base = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("DESK_").split("__"));

    let profile: Option<Profile> = cli_profile
        .cloned()
        .or_else(|| base.extract_inner("profile").ok());

    // Pass 2: rebuild with profile defaults as a layer between defaults and config.toml
    let profile_layer = profile_to_file_config(profile.as_ref());

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Serialized::defaults(profile_layer))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("DESK_").split("__"))
}

/// Convert a profile into a `FileConfig` with the profile's default values filled in.
fn profile_to_file_config(profile: Option<&Profile>) -> FileConfig {
    match profile {
        Some(Profile::Local) => FileConfig {
            profile: Some(Profile::Local),
            server: ServerFileConfig {
                host: Some("127.0.0.1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
        Some(Profile::Lan) => FileConfig {
            profile: Some(Profile::Lan),
            server: ServerFileConfig {
                host: Some("0.0.0.0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        },
        None => FileConfig::default(),
    }
}

// =============================================================================
// Runtime config (derived from FileConfig + CLI, used by the server)
// =============================================================================

/// Values given on the command line; each wins over every file/env layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub default_theme: String,
    pub storage: StorageConfig,
    pub send_channel_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub files_dir: PathBuf,
}

impl ServerConfig {
    pub fn resolve(fc: &FileConfig, dirs: &DeskConfig, cli: &CliOverrides) -> Result<Self> {
        let host = cli
            .host
            .clone()
            .or_else(|| fc.server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(fc.server.port).unwrap_or(DEFAULT_PORT);
        let bind_addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

        Ok(Self {
            bind_addr,
            allowed_origins: fc.server.allowed_origins.clone(),
            default_theme: fc.desktop.default_theme.clone(),
            storage: StorageConfig {
                backend: fc.storage.backend,
                files_dir: fc
                    .storage
                    .files_dir
                    .clone()
                    .unwrap_or_else(|| dirs.files_dir()),
            },
            send_channel_capacity: fc.websocket.send_channel_capacity.max(1),
        })
    }
}

// =============================================================================
// Directory layout config (derived from --data-dir, not tunable via figment)
// =============================================================================

#[derive(Clone, Debug)]
pub struct DeskConfig {
    pub data_dir: PathBuf,
}

impl DeskConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory; pass --data-dir")?
                .join(".desksync"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── profile_to_file_config ──────────────────────────────────────────

    #[test]
    fn test_local_profile() {
        let fc = profile_to_file_config(Some(&Profile::Local));
        assert_eq!(fc.profile, Some(Profile::Local));
        assert_eq!(fc.server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(fc.desktop.default_theme, "system7");
    }

    #[test]
    fn test_lan_profile() {
        let fc = profile_to_file_config(Some(&Profile::Lan));
        assert_eq!(fc.profile, Some(Profile::Lan));
        assert_eq!(fc.server.host.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn test_no_profile() {
        let fc = profile_to_file_config(None);
        assert!(fc.profile.is_none());
        assert!(fc.server.host.is_none());
    }

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let d = FileConfig::default();
        assert!(d.server.port.is_none());
        assert!(d.server.allowed_origins.is_empty());
        assert_eq!(d.desktop.default_theme, "system7");
        assert_eq!(d.storage.backend, StorageBackend::Fs);
        assert!(d.storage.files_dir.is_none());
        assert_eq!(d.websocket.send_channel_capacity, 64);
    }

    // ── ServerConfig::resolve ───────────────────────────────────────────

    #[test]
    fn test_resolve_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DeskConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let sc = ServerConfig::resolve(&FileConfig::default(), &dirs, &CliOverrides::default())
            .unwrap();

        assert_eq!(sc.bind_addr, "127.0.0.1:3001".parse().unwrap());
        assert_eq!(sc.default_theme, "system7");
        assert_eq!(sc.storage.backend, StorageBackend::Fs);
        assert_eq!(sc.storage.files_dir, tmp.path().join("files"));
        assert_eq!(sc.send_channel_capacity, 64);
    }

    #[test]
    fn test_resolve_cli_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DeskConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let fc = FileConfig {
            server: ServerFileConfig {
                host: Some("0.0.0.0".to_string()),
                port: Some(8080),
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = CliOverrides {
            host: None,
            port: Some(9090),
        };
        let sc = ServerConfig::resolve(&fc, &dirs, &cli).unwrap();
        assert_eq!(sc.bind_addr, "0.0.0.0:9090".parse().unwrap());
    }

    #[test]
    fn test_resolve_invalid_host() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DeskConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let cli = CliOverrides {
            host: Some("not a host".to_string()),
            port: None,
        };
        assert!(ServerConfig::resolve(&FileConfig::default(), &dirs, &cli).is_err());
    }

    #[test]
    fn test_resolve_zero_capacity_clamped() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DeskConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let fc = FileConfig {
            websocket: WebSocketFileConfig {
                send_channel_capacity: 0,
            },
            ..Default::default()
        };
        let sc = ServerConfig::resolve(&fc, &dirs, &CliOverrides::default()).unwrap();
        assert_eq!(sc.send_channel_capacity, 1);
    }

    // ── DeskConfig ──────────────────────────────────────────────────────

    #[test]
    fn test_desk_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested/data");
        let config = DeskConfig::new(Some(nested.clone())).unwrap();

        assert_eq!(config.data_dir, nested);
        assert!(nested.exists());
        assert_eq!(config.files_dir(), nested.join("files"));
        assert_eq!(config.config_toml_path(), nested.join("config.toml"));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path(), None).extract().unwrap();
        assert!(fc.profile.is_none());
        assert!(fc.server.host.is_none());
        assert_eq!(fc.desktop.default_theme, "system7");
    }

    #[test]
    fn test_load_config_with_profile() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path(), Some(&Profile::Lan))
            .extract()
            .unwrap();
        assert_eq!(fc.server.host.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn test_load_config_toml_overrides_profile() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nhost = \"10.0.0.5\"\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path(), Some(&Profile::Lan))
            .extract()
            .unwrap();
        assert_eq!(fc.server.host.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_load_config_profile_from_toml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "profile = \"lan\"\n").unwrap();
        let fc: FileConfig = load_config(tmp.path(), None).extract().unwrap();
        assert_eq!(fc.profile, Some(Profile::Lan));
        assert_eq!(fc.server.host.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            concat!(
                "[server]\nport = 8080\nallowed_origins = [\"http://localhost:3002\"]\n",
                "[desktop]\ndefault_theme = \"windows-xp\"\n",
                "[storage]\nbackend = \"memory\"\n",
                "[websocket]\nsend_channel_capacity = 8\n",
            ),
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path(), None).extract().unwrap();
        assert_eq!(fc.server.port, Some(8080));
        assert_eq!(fc.server.allowed_origins, vec!["http://localhost:3002"]);
        assert_eq!(fc.desktop.default_theme, "windows-xp");
        assert_eq!(fc.storage.backend, StorageBackend::Memory);
        assert_eq!(fc.websocket.send_channel_capacity, 8);
    }

    #[test]
    fn test_file_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&FileConfig::default()).unwrap();
        assert!(rendered.contains("default_theme = \"system7\""));
        assert!(rendered.contains("backend = \"fs\""));
    }
}
