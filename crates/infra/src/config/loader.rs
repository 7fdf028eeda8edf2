//! Configuration loader
//!
//! Builds a [`Config`] from a file and `SCRAPESHIELD_*` environment
//! variables.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the process environment when one exists
//! 2. Starts from the file named by `SCRAPESHIELD_CONFIG`, else the first
//!    probed config file, else built-in defaults
//! 3. Applies environment overrides on top; environment values win
//! 4. Validates the result
//!
//! ## Environment Variables
//! - `SCRAPESHIELD_CONFIG`: Explicit config file path
//! - `SCRAPESHIELD_CLASSIFIER_MEMO_CAPACITY`: Memoized classifications kept
//! - `SCRAPESHIELD_CLASSIFIER_MIN_CONTENT_LENGTH`: Shortest plausible body
//! - `SCRAPESHIELD_RETRY_MAX_DELAY_MS`: Backoff delay cap
//! - `SCRAPESHIELD_RETRY_JITTER_FACTOR`: Relative jitter in `[0, 1]`
//! - `SCRAPESHIELD_RETRY_ATTEMPT_TIMEOUT_MS`: First attempt timeout
//! - `SCRAPESHIELD_RETRY_MAX_DURATION_MS`: Default overall deadline (`0` clears it)
//! - `SCRAPESHIELD_BREAKER_THRESHOLD`: Failures that open a circuit
//! - `SCRAPESHIELD_BREAKER_RESET_MS`: Open-state cool-down
//! - `SCRAPESHIELD_PROXY_STRATEGY`: `sequential`, `random` or `performance`
//! - `SCRAPESHIELD_PROXY_FAILURE_THRESHOLD`: Failures that disable a proxy
//! - `SCRAPESHIELD_PROXY_MIN_BAN_MS`: Minimum ban before re-probing
//! - `SCRAPESHIELD_PROXY_HEALTH_CHECK_URL`: Health probe target
//! - `SCRAPESHIELD_PROXY_HEALTH_CHECK_INTERVAL_MS`: Health probe period
//! - `SCRAPESHIELD_PROXY_HEALTH_CHECK_TIMEOUT_MS`: Per-probe timeout
//! - `SCRAPESHIELD_PROXY_STORE_PATH`: Proxy list file (empty disables)
//! - `SCRAPESHIELD_CACHE_DEFAULT_TTL_MS`: Default entry lifetime
//! - `SCRAPESHIELD_CACHE_MAX_ITEMS`: Per-domain capacity
//! - `SCRAPESHIELD_CACHE_PERSIST_PATH`: Cache mirror file (empty disables)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./scrapeshield.toml` or `./scrapeshield.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use scrapeshield_domain::{Config, Result, ScrapeShieldError};

/// Names probed in every candidate directory, in priority order.
const CONFIG_FILE_NAMES: [&str; 4] =
    ["scrapeshield.toml", "scrapeshield.json", "config.toml", "config.json"];

/// Variable naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "SCRAPESHIELD_CONFIG";

type Override = fn(&mut Config, &str) -> anyhow::Result<()>;

/// Every recognised environment override and how it applies.
pub static ENV_OVERRIDES: &[(&str, Override)] = &[
    ("SCRAPESHIELD_CLASSIFIER_MEMO_CAPACITY", |c: &mut Config, v: &str| {
        c.classifier.memo_capacity = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_CLASSIFIER_MIN_CONTENT_LENGTH", |c: &mut Config, v: &str| {
        c.classifier.min_content_length = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_RETRY_MAX_DELAY_MS", |c: &mut Config, v: &str| {
        c.retry.max_delay = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_RETRY_JITTER_FACTOR", |c: &mut Config, v: &str| {
        c.retry.jitter_factor = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_RETRY_ATTEMPT_TIMEOUT_MS", |c: &mut Config, v: &str| {
        c.retry.attempt_timeout = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_RETRY_MAX_DURATION_MS", |c: &mut Config, v: &str| {
        let duration = millis(v)?;
        c.retry.max_duration = (!duration.is_zero()).then_some(duration);
        Ok(())
    }),
    ("SCRAPESHIELD_BREAKER_THRESHOLD", |c: &mut Config, v: &str| {
        c.circuit_breaker.threshold = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_BREAKER_RESET_MS", |c: &mut Config, v: &str| {
        c.circuit_breaker.reset_time = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_STRATEGY", |c: &mut Config, v: &str| {
        c.proxy_pool.strategy = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_FAILURE_THRESHOLD", |c: &mut Config, v: &str| {
        c.proxy_pool.failure_threshold = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_MIN_BAN_MS", |c: &mut Config, v: &str| {
        c.proxy_pool.min_ban_duration = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_HEALTH_CHECK_URL", |c: &mut Config, v: &str| {
        let url = v.trim();
        if url.is_empty() {
            return Err(anyhow!("health check URL must not be empty"));
        }
        c.proxy_pool.health_check_url = url.to_string();
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_HEALTH_CHECK_INTERVAL_MS", |c: &mut Config, v: &str| {
        c.proxy_pool.health_check_interval = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_HEALTH_CHECK_TIMEOUT_MS", |c: &mut Config, v: &str| {
        c.proxy_pool.health_check_timeout = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_PROXY_STORE_PATH", |c: &mut Config, v: &str| {
        c.proxy_pool.store_path = optional_path(v);
        Ok(())
    }),
    ("SCRAPESHIELD_CACHE_DEFAULT_TTL_MS", |c: &mut Config, v: &str| {
        c.cache.default_ttl = millis(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_CACHE_MAX_ITEMS", |c: &mut Config, v: &str| {
        c.cache.max_items_per_domain = parse(v)?;
        Ok(())
    }),
    ("SCRAPESHIELD_CACHE_PERSIST_PATH", |c: &mut Config, v: &str| {
        c.cache.persist_path = optional_path(v);
        Ok(())
    }),
];

/// Load configuration with automatic fallback strategy
///
/// A config file (explicit, probed, or none) forms the base layer and
/// `SCRAPESHIELD_*` variables override it field by field. Without any file
/// the built-in defaults are the base.
///
/// # Errors
/// Returns `ScrapeShieldError::Config` if:
/// - `SCRAPESHIELD_CONFIG` names a missing file
/// - File format is invalid
/// - An environment value does not parse
/// - The merged configuration fails validation
pub fn load() -> Result<Config> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let explicit = std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from);
    let mut config = match explicit.or_else(probe_config_paths) {
        Some(path) => read_config_file(&path)?,
        None => {
            tracing::info!("No config file found, starting from defaults");
            Config::default()
        }
    };

    let applied = apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    if applied > 0 {
        tracing::info!(overrides = applied, "Applied environment overrides");
    }

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// Every variable is optional; missing ones keep their defaults.
///
/// # Environment Variables
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `ScrapeShieldError::Config` if a variable has an invalid value or
/// the result fails validation.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`probe_config_paths`].
///
/// # Errors
/// Returns `ScrapeShieldError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The parsed configuration fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => p,
        None => probe_config_paths().ok_or_else(|| {
            ScrapeShieldError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    let config = read_config_file(&config_path)?;
    config.validate()?;
    Ok(config)
}

/// Apply every `SCRAPESHIELD_*` override that `lookup` resolves.
///
/// Returns how many overrides were applied.
///
/// # Errors
/// Returns `ScrapeShieldError::Config` naming the first variable whose value
/// does not parse.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = 0;
    for (name, apply) in ENV_OVERRIDES {
        let Some(raw) = lookup(name) else { continue };
        apply(config, &raw)
            .with_context(|| format!("Invalid value for {name}: {raw:?}"))
            .map_err(|e| ScrapeShieldError::Config(format!("{e:#}")))?;
        applied += 1;
    }
    Ok(applied)
}

fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(ScrapeShieldError::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| ScrapeShieldError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ScrapeShieldError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ScrapeShieldError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ScrapeShieldError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the current working directory, its parent and grandparent, then
/// the executable's directory, trying [`CONFIG_FILE_NAMES`] in each.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    let found = first_existing(&dirs);
    match &found {
        Some(path) => tracing::debug!(path = %path.display(), "Found config file"),
        None => tracing::debug!("No config file found in standard locations"),
    }
    found
}

fn first_existing(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

fn parse<T>(raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| anyhow!("{e}"))
}

fn millis(raw: &str) -> anyhow::Result<Duration> {
    parse::<u64>(raw).map(Duration::from_millis)
}

fn optional_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}
