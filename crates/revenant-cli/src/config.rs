//! Locating and loading the scenario config.
//!
//! Resolution chain: `--config` flag > `REVENANT_CONFIG` env var >
//! `./revenant.toml` > `~/.config/revenant/config.toml` > built-in defaults.
//! `REVENANT_BASE_URL` then overrides `service.base_url` whichever source won.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use revenant_core::ScenarioConfig;

pub const CONFIG_ENV: &str = "REVENANT_CONFIG";
pub const BASE_URL_ENV: &str = "REVENANT_BASE_URL";
const LOCAL_FILE: &str = "revenant.toml";

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the revenant config directory.
///
/// XDG layout on every platform: `$XDG_CONFIG_HOME/revenant` or
/// `~/.config/revenant`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("revenant");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("revenant")
}

pub fn user_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Where the config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    WorkingDir(PathBuf),
    UserConfig(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Flag(p) | Self::Env(p) | Self::WorkingDir(p) | Self::UserConfig(p) => {
                Some(p.as_path())
            }
            Self::Defaults => None,
        }
    }

    /// Flag and env sources name a file that must exist.
    fn is_explicit(&self) -> bool {
        matches!(self, Self::Flag(_) | Self::Env(_))
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(p) => write!(f, "{} (--config)", p.display()),
            Self::Env(p) => write!(f, "{} (${CONFIG_ENV})", p.display()),
            Self::WorkingDir(p) | Self::UserConfig(p) => write!(f, "{}", p.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Pick the config source, looking for the local file in `workdir`.
pub fn locate(cli_path: Option<&Path>, workdir: &Path) -> ConfigSource {
    if let Some(path) = cli_path {
        return ConfigSource::Flag(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return ConfigSource::Env(PathBuf::from(path));
        }
    }
    let local = workdir.join(LOCAL_FILE);
    if local.is_file() {
        return ConfigSource::WorkingDir(local);
    }
    let user = user_config_path();
    if user.is_file() {
        return ConfigSource::UserConfig(user);
    }
    ConfigSource::Defaults
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub config: ScenarioConfig,
    pub source: ConfigSource,
}

impl ResolvedConfig {
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve_in(cli_path, &workdir)
    }

    pub fn resolve_in(cli_path: Option<&Path>, workdir: &Path) -> Result<Self> {
        let source = locate(cli_path, workdir);

        let mut config = match source.path() {
            Some(path) => {
                if source.is_explicit() && !path.is_file() {
                    bail!("config file {} does not exist", path.display());
                }
                ScenarioConfig::load(path)
                    .with_context(|| format!("failed to load config from {source}"))?
            }
            None => ScenarioConfig::default(),
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.is_empty() {
                config.service.base_url = url;
                config
                    .validate()
                    .with_context(|| format!("invalid ${BASE_URL_ENV}"))?;
            }
        }

        Ok(Self { config, source })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    /// Point the user config dir at `dir` and clear the revenant variables.
    fn isolate(dir: &Path) {
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir) };
        unsafe { std::env::remove_var(CONFIG_ENV) };
        unsafe { std::env::remove_var(BASE_URL_ENV) };
    }

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn defaults_when_nothing_is_found() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        let resolved = ResolvedConfig::resolve_in(None, tmp.path()).unwrap();

        assert_eq!(resolved.source, ConfigSource::Defaults);
        assert_eq!(resolved.config.service.base_url, "http://localhost:8080");
    }

    #[test]
    fn flag_beats_env_and_local_file() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        let flag = tmp.path().join("flag.toml");
        write(&flag, "[service]\nbase_url = \"http://flag:1\"\n");
        let env = tmp.path().join("env.toml");
        write(&env, "[service]\nbase_url = \"http://env:1\"\n");
        write(&tmp.path().join(LOCAL_FILE), "[service]\nbase_url = \"http://local:1\"\n");
        unsafe { std::env::set_var(CONFIG_ENV, &env) };

        let resolved = ResolvedConfig::resolve_in(Some(&flag), tmp.path()).unwrap();
        unsafe { std::env::remove_var(CONFIG_ENV) };

        assert_eq!(resolved.source, ConfigSource::Flag(flag));
        assert_eq!(resolved.config.service.base_url, "http://flag:1");
    }

    #[test]
    fn env_beats_local_file() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        let env = tmp.path().join("env.toml");
        write(&env, "[timings]\nbaseline_secs = 5\n");
        write(&tmp.path().join(LOCAL_FILE), "[timings]\nbaseline_secs = 7\n");
        unsafe { std::env::set_var(CONFIG_ENV, &env) };

        let resolved = ResolvedConfig::resolve_in(None, tmp.path()).unwrap();
        unsafe { std::env::remove_var(CONFIG_ENV) };

        assert_eq!(resolved.source, ConfigSource::Env(env));
        assert_eq!(resolved.config.timings.baseline_secs, 5);
    }

    #[test]
    fn local_file_beats_user_config() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let xdg = tmp.path().join("xdg");
        isolate(&xdg);

        write(&xdg.join("revenant").join("config.toml"), "[health]\nmax_attempts = 3\n");
        let local = tmp.path().join(LOCAL_FILE);
        write(&local, "[health]\nmax_attempts = 9\n");

        let resolved = ResolvedConfig::resolve_in(None, tmp.path()).unwrap();

        assert_eq!(resolved.source, ConfigSource::WorkingDir(local));
        assert_eq!(resolved.config.health.max_attempts, 9);
    }

    #[test]
    fn user_config_is_the_last_file_checked() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let xdg = tmp.path().join("xdg");
        isolate(&xdg);

        let user = xdg.join("revenant").join("config.toml");
        write(&user, "[teardown]\non_success = true\n");

        let resolved = ResolvedConfig::resolve_in(None, &tmp.path().join("elsewhere")).unwrap();

        assert_eq!(resolved.source, ConfigSource::UserConfig(user));
        assert!(resolved.config.teardown.on_success);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        let missing = tmp.path().join("nope.toml");
        let err = ResolvedConfig::resolve_in(Some(&missing), tmp.path()).unwrap_err();

        assert!(err.to_string().contains("does not exist"), "unexpected error: {err}");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        let bad = tmp.path().join("bad.toml");
        write(&bad, "[workflow]\npayload_template = \"not json {instance_id}\"\n");

        let err = ResolvedConfig::resolve_in(Some(&bad), tmp.path()).unwrap_err();

        assert!(
            format!("{err:#}").contains("payload_template"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn base_url_env_overrides_any_source() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        write(&tmp.path().join(LOCAL_FILE), "[service]\nbase_url = \"http://local:1\"\n");
        unsafe { std::env::set_var(BASE_URL_ENV, "http://override:9000") };

        let resolved = ResolvedConfig::resolve_in(None, tmp.path());
        unsafe { std::env::remove_var(BASE_URL_ENV) };

        let resolved = resolved.unwrap();
        assert_eq!(resolved.config.service.base_url, "http://override:9000");
        assert_eq!(resolved.config.health_url(), "http://override:9000/health");
    }

    #[test]
    fn non_http_base_url_env_is_rejected() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        isolate(&tmp.path().join("xdg"));

        unsafe { std::env::set_var(BASE_URL_ENV, "localhost:8080") };
        let result = ResolvedConfig::resolve_in(None, tmp.path());
        unsafe { std::env::remove_var(BASE_URL_ENV) };

        assert!(result.is_err());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = user_config_path();
        assert!(
            path.ends_with("revenant/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
