//! KMS scanout backend for virtual machine consoles
//!
//! Presents frames produced by a guest graphics pipeline on a physical
//! display. The guest hands over dma-bufs; this crate registers them as
//! framebuffers on a DRM device and mode-sets a CRTC to show them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Host display framework (consoles)              │
//! └─────────────────────────────────────────────────────────────┘
//!                 │ DisplayListener          ▲ DisplayHost
//!                 ▼                          │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 kms-scanout (DrmDisplay)                    │
//! │  ┌──────────────────┐  ┌────────────────┐  ┌─────────────┐  │
//! │  │ Resource binder  │  │ Scanout driver │  │ Mode choice │  │
//! │  │ conn/enc/CRTC    │  │ fb + cursor    │  │ first fit   │  │
//! │  └──────────────────┘  └────────────────┘  └─────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ KmsDevice
//! ┌─────────────────────────────────────────────────────────────┐
//! │              DRM card node (/dev/dri/cardN)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use kms_scanout::{Config, DrmCard, DrmDisplay, DisplayListener};
//!
//! let config = Config::default();
//! let card = Rc::new(DrmCard::open(&config.device)?);
//! let mut display = DrmDisplay::new(card, host, &config)?;
//!
//! // Wire the host's console callbacks to `display`.
//! display.surface_changed(Some(surface));
//! display.scanout_dmabuf(&dmabuf);
//! display.flush(region);
//! ```

pub mod binder;
pub mod config;
pub mod drm_device;
pub mod error;
pub mod kms;
pub mod listener;
pub mod mode;
pub mod output;
pub mod scanout;

#[cfg(test)]
mod testing;

pub use binder::bind;
pub use config::{Config, ScanoutPolicy};
pub use drm_device::DrmCard;
pub use error::Error;
pub use kms::KmsDevice;
pub use listener::{DisplayHost, DisplayListener, DrmDisplay};
pub use mode::choose_mode;
pub use output::Output;
pub use scanout::{DmaBuf, Rect, ScanoutDriver, ScanoutState, Surface};

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;
