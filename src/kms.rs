//! Device-facing KMS interface
//!
//! Everything the binder and the scanout driver need from a display device
//! goes through [`KmsDevice`]. Enumeration results are returned as owned
//! snapshots so nothing handed out borrows from the device.

use std::io;
use std::os::fd::BorrowedFd;

use drm::buffer::{self, DrmFourcc, DrmModifier, PlanarBuffer};
use drm::control::{connector, crtc, encoder, framebuffer, Mode};

/// Resource handles of a device, in kernel enumeration order.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub connectors: Vec<connector::Handle>,
    pub crtcs: Vec<crtc::Handle>,
}

/// Snapshot of a connector
#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub handle: connector::Handle,
    /// Human readable name such as `HDMIA-1`
    pub name: String,
    pub state: connector::State,
    pub modes: Vec<Mode>,
    pub encoders: Vec<encoder::Handle>,
    /// Encoder currently driving this connector, if it was ever bound
    pub current_encoder: Option<encoder::Handle>,
}

impl ConnectorInfo {
    pub fn is_connected(&self) -> bool {
        self.state == connector::State::Connected
    }
}

/// Snapshot of an encoder
#[derive(Debug, Clone, Copy)]
pub struct EncoderInfo {
    pub handle: encoder::Handle,
    /// CRTC the encoder is currently wired to
    pub crtc: Option<crtc::Handle>,
    /// Bit `i` is set when the CRTC at index `i` of [`Resources::crtcs`]
    /// can drive this encoder.
    pub possible_crtcs: u32,
}

impl EncoderInfo {
    pub fn can_drive(&self, crtc_index: usize) -> bool {
        crtc_index < 32 && self.possible_crtcs & (1 << crtc_index) != 0
    }
}

/// Single-plane framebuffer registration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub handle: buffer::Handle,
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    pub pitch: u32,
    pub modifier: DrmModifier,
}

impl PlanarBuffer for FramebufferDesc {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        Some(self.modifier)
    }

    fn pitches(&self) -> [u32; 4] {
        [self.pitch, 0, 0, 0]
    }

    fn handles(&self) -> [Option<buffer::Handle>; 4] {
        [Some(self.handle), None, None, None]
    }

    fn offsets(&self) -> [u32; 4] {
        [0; 4]
    }
}

/// Hardware cursor image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorImage {
    pub handle: buffer::Handle,
    pub width: u32,
    pub height: u32,
    pub hotspot: (i32, i32),
}

impl buffer::Buffer for CursorImage {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> DrmFourcc {
        DrmFourcc::Argb8888
    }

    fn pitch(&self) -> u32 {
        self.width * 4
    }

    fn handle(&self) -> buffer::Handle {
        self.handle
    }
}

/// Operations issued against a KMS device.
///
/// All calls are blocking ioctls on the caller's thread.
pub trait KmsDevice {
    /// Ask the kernel to expose primary and cursor planes.
    fn enable_universal_planes(&self) -> io::Result<()>;

    fn resources(&self) -> io::Result<Resources>;

    fn connector(&self, handle: connector::Handle) -> io::Result<ConnectorInfo>;

    fn encoder(&self, handle: encoder::Handle) -> io::Result<EncoderInfo>;

    /// Convert a dma-buf file descriptor into a device-local buffer handle.
    fn import_buffer(&self, fd: BorrowedFd<'_>) -> io::Result<buffer::Handle>;

    /// Drop a handle returned by `import_buffer`. Framebuffers created from
    /// it keep the underlying memory alive.
    fn close_buffer(&self, handle: buffer::Handle) -> io::Result<()>;

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> io::Result<framebuffer::Handle>;

    fn remove_framebuffer(&self, fb: framebuffer::Handle) -> io::Result<()>;

    /// Scan `fb` out at offset (0, 0) through `connector` using `mode`.
    fn set_crtc(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        connector: connector::Handle,
        mode: &Mode,
    ) -> io::Result<()>;

    /// Turn the CRTC off, detaching any framebuffer and connectors.
    fn disable_crtc(&self, crtc: crtc::Handle) -> io::Result<()>;

    /// Program the cursor image, or hide the cursor with `None`.
    fn set_cursor(&self, crtc: crtc::Handle, image: Option<&CursorImage>) -> io::Result<()>;

    fn move_cursor(&self, crtc: crtc::Handle, x: i32, y: i32) -> io::Result<()>;
}
