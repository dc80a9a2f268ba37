//! Bound display path

use drm::buffer;
use drm::control::{connector, crtc, framebuffer, Mode};

use crate::kms::{ConnectorInfo, CursorImage};

/// Cursor buffer imported from the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorBuffer {
    pub handle: buffer::Handle,
    pub width: u32,
    pub height: u32,
    pub hotspot: (u32, u32),
}

impl CursorBuffer {
    pub(crate) fn image(&self) -> CursorImage {
        CursorImage {
            handle: self.handle,
            width: self.width,
            height: self.height,
            hotspot: (self.hotspot.0 as i32, self.hotspot.1 as i32),
        }
    }
}

/// One connector driven by one CRTC.
///
/// The connector and CRTC never change after binding. The mode, the primary
/// framebuffer and the cursor follow the frames pushed through the scanout
/// driver.
#[derive(Debug, Clone)]
pub struct Output {
    connector: ConnectorInfo,
    crtc: crtc::Handle,
    pub(crate) mode: Option<Mode>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) fb: Option<framebuffer::Handle>,
    pub(crate) cursor: Option<CursorBuffer>,
}

impl Output {
    pub(crate) fn new(connector: ConnectorInfo, crtc: crtc::Handle) -> Self {
        let mode = connector.modes.first().copied();
        Self {
            connector,
            crtc,
            mode,
            width: 0,
            height: 0,
            fb: None,
            cursor: None,
        }
    }

    pub fn connector(&self) -> &ConnectorInfo {
        &self.connector
    }

    pub fn connector_id(&self) -> connector::Handle {
        self.connector.handle
    }

    pub fn crtc_id(&self) -> crtc::Handle {
        self.crtc
    }

    /// Modes advertised by the connector at bind time
    pub fn modes(&self) -> &[Mode] {
        &self.connector.modes
    }

    /// Mode of the last successful commit, or the connector's first mode
    /// before any commit.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Dimensions of the current primary framebuffer
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn framebuffer(&self) -> Option<framebuffer::Handle> {
        self.fb
    }

    pub fn cursor(&self) -> Option<&CursorBuffer> {
        self.cursor.as_ref()
    }
}
