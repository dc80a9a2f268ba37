//! Error types for the KMS scanout backend

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open DRM device {}: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("DRM device error: {context}: {source}")]
    Device {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no connected output found")]
    NoOutput,

    #[error("no CRTC can drive connector {0}")]
    NoCrtc(String),

    #[error("dma-buf fd to handle conversion failed: {0}")]
    Import(#[source] std::io::Error),

    #[error("framebuffer registration failed: {0}")]
    Framebuffer(#[source] std::io::Error),

    #[error("no mode fits a {width}x{height} framebuffer")]
    NoMode { width: u32, height: u32 },

    #[error("commit rejected: {0}")]
    Precondition(String),

    #[error("CRTC mode-set failed: {0}")]
    ModeSet(#[source] std::io::Error),

    #[error("cursor update failed: {0}")]
    Cursor(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Per-frame failures that leave the session usable.
    ///
    /// Everything else happens while opening or binding the device and means
    /// there is no display to drive.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Import(_)
                | Error::Framebuffer(_)
                | Error::NoMode { .. }
                | Error::Precondition(_)
                | Error::ModeSet(_)
                | Error::Cursor(_)
        )
    }
}
