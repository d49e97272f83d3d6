use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_PHASE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DEBOUNCE_MS: u64 = 1000;

fn default_install_command() -> Vec<String> {
    vec!["npm".into(), "install".into()]
}

fn default_build_command() -> Vec<String> {
    vec!["npm".into(), "run".into(), "build".into()]
}

// ─── BuildConfig ──────────────────────────────────────────────────────────────

/// Build pipeline configuration (`[build]` in config.toml).
///
/// Commands are argv vectors — first element is the binary. The defaults
/// drive an npm/Vite project; substitute your own tooling per deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Dependency installation command (phase 1). Default: `npm install`.
    pub install_command: Vec<String>,
    /// Project build command (phase 2). Default: `npm run build`.
    pub build_command: Vec<String>,
    /// Wall-clock budget per phase, in seconds (default: 300).
    /// A phase exceeding it is killed and the build ends in Error.
    pub phase_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install_command: default_install_command(),
            build_command: default_build_command(),
            phase_timeout_secs: DEFAULT_PHASE_TIMEOUT_SECS,
        }
    }
}

// ─── WatchConfig ──────────────────────────────────────────────────────────────

/// File watcher configuration (`[watch]` in config.toml).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window in milliseconds (default: 1000). A burst of events
    /// to the same path collapses to one rebuild trigger, fired this long
    /// after the last event.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Root directory holding one project tree per session
    /// (default: `{data_dir}/projects`).
    projects_dir: Option<PathBuf>,
    /// Log level filter string, e.g. "debug", "info,previewd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    build: Option<BuildConfig>,
    watch: Option<WatchConfig>,
}

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub build: BuildConfig,
    pub watch: WatchConfig,
}

impl DaemonConfig {
    /// Resolve configuration from CLI overrides plus `{data_dir}/config.toml`.
    ///
    /// A missing config file is fine; a malformed one logs a warning and
    /// falls back to defaults rather than refusing to start.
    pub fn new(
        data_dir: Option<PathBuf>,
        projects_dir: Option<PathBuf>,
        log: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml_cfg = load_toml(&data_dir.join("config.toml"));

        let projects_dir = projects_dir
            .or(toml_cfg.projects_dir)
            .unwrap_or_else(|| data_dir.join("projects"));

        Self {
            projects_dir,
            log: log
                .or(toml_cfg.log)
                .unwrap_or_else(|| "info".to_string()),
            log_format: toml_cfg
                .log_format
                .unwrap_or_else(|| "pretty".to_string()),
            build: toml_cfg.build.unwrap_or_default(),
            watch: toml_cfg.watch.unwrap_or_default(),
            data_dir,
        }
    }

    pub fn debounce_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.watch.debounce_ms)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".previewd")
}

fn load_toml(path: &Path) -> TomlConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "malformed config.toml — using defaults");
                TomlConfig::default()
            }
        },
        Err(_) => TomlConfig::default(),
    }
}
