//! Configuration loaded from a TOML file

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Default card node
pub const DEFAULT_DEVICE: &str = "/dev/dri/card0";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Card node to open
    pub device: PathBuf,
    /// Accept GPU (dma-buf) scanout from the host. Reported to the host via
    /// `DisplayListener::needs_gl`.
    pub gl_scanout: bool,
    pub policy: ScanoutPolicy,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            gl_scanout: true,
            policy: ScanoutPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

/// How the scanout driver sequences cursor removal and buffer release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanoutPolicy {
    /// Hide the hardware cursor on the next commit after the guest removes it.
    /// When off, the last cursor image stays on screen.
    pub disable_cursor_on_remove: bool,
    /// Hold back deregistration of the framebuffer being scanned out until
    /// a commit has replaced it.
    pub defer_release_while_presented: bool,
}

impl Default for ScanoutPolicy {
    fn default() -> Self {
        Self {
            disable_cursor_on_remove: true,
            defer_release_while_presented: true,
        }
    }
}

impl ScanoutPolicy {
    /// Leave the cursor programmed after removal and deregister framebuffers
    /// as soon as the host retires them.
    pub fn legacy() -> Self {
        Self {
            disable_cursor_on_remove: false,
            defer_release_while_presented: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Also write daily-rotated log files here
    pub directory: Option<PathBuf>,
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: Option<String>,
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
