//! Engine launch configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Disables the browser sandbox (restricted hosts, containers).
pub const ENV_NO_SANDBOX: &str = "PDF_FILLER_NO_SANDBOX";
/// Runs the browser with a visible window instead of headless.
pub const ENV_NO_HEADLESS: &str = "PDF_FILLER_NO_HEADLESS";
/// Path to the browser executable; auto-detected when unset.
pub const ENV_CHROME: &str = "PDF_FILLER_CHROME";
/// Launch timeout in whole seconds.
pub const ENV_LAUNCH_TIMEOUT: &str = "PDF_FILLER_LAUNCH_TIMEOUT_SECS";

/// Arguments passed to every launch. Pages are loaded from `about:blank`
/// with inlined assets, so proxies and same-origin checks only get in the way.
pub const DEFAULT_ARGS: &[&str] = &[
    "--proxy-server=direct://",
    "--proxy-bypass-list=*",
    "--disable-web-security",
];

/// Settings used when the session launches its rendering engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run without a visible window (default: true).
    pub headless: bool,
    /// Keep the process sandbox enabled (default: true).
    pub sandbox: bool,
    /// Explicit browser executable.
    pub executable: Option<PathBuf>,
    /// How long a launch may take before it is reported as failed.
    pub launch_timeout: Duration,
    /// How long shutting a browser down may take before the session gives up
    /// on it and moves on.
    pub close_timeout: Duration,
    /// Extra command-line arguments appended after [`DEFAULT_ARGS`].
    pub extra_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            executable: None,
            launch_timeout: Duration::from_secs(20),
            close_timeout: Duration::from_secs(10),
            extra_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or malformed values
    /// fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str| lookup(key).map(|v| is_truthy(&v)).unwrap_or(false);

        let launch_timeout = match lookup(ENV_LAUNCH_TIMEOUT) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    log::warn!(
                        "Ignoring {ENV_LAUNCH_TIMEOUT}={raw:?}: expected a positive integer"
                    );
                    defaults.launch_timeout
                }
            },
            None => defaults.launch_timeout,
        };

        Self {
            headless: !flag(ENV_NO_HEADLESS),
            sandbox: !flag(ENV_NO_SANDBOX),
            executable: lookup(ENV_CHROME)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            launch_timeout,
            close_timeout: defaults.close_timeout,
            extra_args: defaults.extra_args,
        }
    }

    /// Full argument list for the launch, sandbox flags included.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = DEFAULT_ARGS.iter().map(|a| a.to_string()).collect();
        if !self.sandbox {
            args.push("--no-sandbox".into());
            args.push("--disable-setuid-sandbox".into());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
