//! Scanout driver
//!
//! Turns imported dma-bufs into framebuffers and puts them on the bound
//! output. Per-output state machine:
//!
//! ```text
//!   Idle ──import──▶ FramebufferBound ──commit ok──▶ Presenting
//!                        ▲    │  ▲                      │
//!                        │    └──┘ commit failed        │
//!                        └──────────── import ──────────┘
//! ```

use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::rc::Rc;

use drm::buffer::{self, DrmFourcc, DrmModifier};
use drm::control::framebuffer;
use tracing::{debug, info, warn};

use crate::config::ScanoutPolicy;
use crate::kms::{FramebufferDesc, KmsDevice};
use crate::listener::DisplayHost;
use crate::mode::choose_mode;
use crate::output::{CursorBuffer, Output};
use crate::{Error, Result};

/// Pixel format the host surface must use for a commit to be accepted.
/// Little-endian XRGB8888, i.e. B, G, R, X in memory.
pub const SURFACE_FORMAT: DrmFourcc = DrmFourcc::Xrgb8888;

/// Cross-process GPU buffer handed over by the host
#[derive(Debug)]
pub struct DmaBuf {
    pub fd: OwnedFd,
    pub width: u32,
    pub height: u32,
    pub fourcc: DrmFourcc,
    pub stride: u32,
    pub modifier: DrmModifier,
}

/// Damaged or flushed area, in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Host pixel surface the guest console renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanoutState {
    Idle,
    FramebufferBound,
    Presenting,
}

/// Host-side view of the display, independent of imported buffers
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub surface: Option<Surface>,
    pub cursor_position: (u32, u32),
}

pub struct ScanoutDriver<D: KmsDevice> {
    device: Rc<D>,
    output: Output,
    session: Session,
    policy: ScanoutPolicy,
    state: ScanoutState,
    /// Framebuffer last put on the CRTC by a successful mode-set
    presented: Option<framebuffer::Handle>,
    cursor_disable_pending: bool,
    pending_release: Vec<framebuffer::Handle>,
}

impl<D: KmsDevice> ScanoutDriver<D> {
    pub fn new(device: Rc<D>, output: Output, policy: ScanoutPolicy) -> Self {
        Self {
            device,
            output,
            session: Session::default(),
            policy,
            state: ScanoutState::Idle,
            presented: None,
            cursor_disable_pending: false,
            pending_release: Vec::new(),
        }
    }

    pub fn device(&self) -> &Rc<D> {
        &self.device
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> ScanoutState {
        self.state
    }

    /// Framebuffer currently on screen
    pub fn presented(&self) -> Option<framebuffer::Handle> {
        self.presented
    }

    pub fn set_surface(&mut self, surface: Option<Surface>) {
        self.session.surface = surface;
    }

    /// Register `dmabuf` as the output's primary framebuffer.
    ///
    /// The previous framebuffer stays registered (and on screen) until the
    /// host releases it. On failure nothing changes. The imported handle is
    /// closed either way; the framebuffer keeps its own reference.
    pub fn import_primary(&mut self, dmabuf: &DmaBuf) -> Result<framebuffer::Handle> {
        let handle = self
            .device
            .import_buffer(dmabuf.fd.as_fd())
            .map_err(Error::Import)?;

        let desc = FramebufferDesc {
            handle,
            width: dmabuf.width,
            height: dmabuf.height,
            format: dmabuf.fourcc,
            pitch: dmabuf.stride,
            modifier: dmabuf.modifier,
        };
        let fb = self.device.add_framebuffer(&desc);
        self.close_handle(handle);
        let fb = fb.map_err(Error::Framebuffer)?;

        if let Some(old) = self.output.fb.replace(fb) {
            debug!("Framebuffer {:?} superseded by {:?}", old, fb);
        }
        self.output.width = dmabuf.width;
        self.output.height = dmabuf.height;
        self.state = ScanoutState::FramebufferBound;

        Ok(fb)
    }

    /// Set the cursor image, or remove the cursor with `None`.
    pub fn import_cursor(
        &mut self,
        dmabuf: Option<&DmaBuf>,
        hotspot: Option<(u32, u32)>,
    ) -> Result<()> {
        let Some(dmabuf) = dmabuf else {
            if let Some(old) = self.output.cursor.take() {
                self.close_handle(old.handle);
                if self.policy.disable_cursor_on_remove {
                    self.cursor_disable_pending = true;
                }
            }
            return Ok(());
        };

        let handle = self
            .device
            .import_buffer(dmabuf.fd.as_fd())
            .map_err(Error::Import)?;

        let old = self.output.cursor.replace(CursorBuffer {
            handle,
            width: dmabuf.width,
            height: dmabuf.height,
            hotspot: hotspot.unwrap_or((0, 0)),
        });
        if let Some(old) = old {
            self.close_handle(old.handle);
        }
        self.cursor_disable_pending = false;

        Ok(())
    }

    /// Close an imported buffer handle unless the cursor still uses it.
    fn close_handle(&self, handle: buffer::Handle) {
        // Importing the same dma-buf twice yields the same handle.
        if self.output.cursor.map(|cursor| cursor.handle) == Some(handle) {
            return;
        }
        if let Err(e) = self.device.close_buffer(handle) {
            warn!("Failed to close buffer {:?}: {}", handle, e);
        }
    }

    /// Applied by the next commit.
    pub fn set_cursor_position(&mut self, x: u32, y: u32) {
        self.session.cursor_position = (x, y);
    }

    /// Deregister a framebuffer the host no longer needs.
    ///
    /// On failure the framebuffer stays bound and registered.
    pub fn release(&mut self, fb: framebuffer::Handle) -> Result<()> {
        let on_screen = self.presented == Some(fb);

        if self.policy.defer_release_while_presented && on_screen {
            debug!("Framebuffer {:?} is on screen, deferring release", fb);
            if !self.pending_release.contains(&fb) {
                self.pending_release.push(fb);
            }
        } else {
            self.device
                .remove_framebuffer(fb)
                .map_err(Error::Framebuffer)?;
            if on_screen {
                // The CRTC went blank with it.
                self.presented = None;
            }
        }

        if self.output.fb == Some(fb) {
            self.output.fb = None;
        }
        self.state = match self.state {
            ScanoutState::FramebufferBound if self.output.fb.is_none() => ScanoutState::Idle,
            ScanoutState::Presenting if self.presented.is_none() => {
                if self.output.fb.is_some() {
                    ScanoutState::FramebufferBound
                } else {
                    ScanoutState::Idle
                }
            }
            state => state,
        };

        Ok(())
    }

    /// Put the current framebuffer on screen and tell the host `region` is
    /// presented.
    ///
    /// On failure the previous presentation stays up and the commit can be
    /// retried with the next frame.
    pub fn commit<H: DisplayHost + ?Sized>(&mut self, region: Rect, host: &mut H) -> Result<()> {
        match self.try_commit() {
            Ok(()) => {
                self.state = ScanoutState::Presenting;
                host.notify_presented(region);
                Ok(())
            }
            Err(e) => {
                if self.output.fb.is_some() {
                    self.state = ScanoutState::FramebufferBound;
                }
                Err(e)
            }
        }
    }

    fn try_commit(&mut self) -> Result<()> {
        let fb = self.check_preconditions()?;

        let (width, height) = self.output.size();
        let mode = choose_mode(self.output.modes(), width, height)
            .ok_or(Error::NoMode { width, height })?;

        let crtc = self.output.crtc_id();
        self.device
            .set_crtc(crtc, fb, self.output.connector_id(), &mode)
            .map_err(Error::ModeSet)?;

        if self.output.mode != Some(mode) {
            let (hdisplay, vdisplay) = mode.size();
            info!("Mode set to {}x{}@{}", hdisplay, vdisplay, mode.vrefresh());
        }
        self.output.mode = Some(mode);
        self.presented = Some(fb);
        self.release_replaced();

        self.program_cursor().map_err(Error::Cursor)
    }

    fn check_preconditions(&self) -> Result<framebuffer::Handle> {
        let surface = self
            .session
            .surface
            .ok_or_else(|| Error::Precondition("no surface".into()))?;
        let fb = self
            .output
            .fb
            .ok_or_else(|| Error::Precondition("no framebuffer bound".into()))?;

        let (width, height) = self.output.size();
        if (surface.width, surface.height) != (width, height) {
            return Err(Error::Precondition(format!(
                "surface is {}x{} but framebuffer is {}x{}",
                surface.width, surface.height, width, height
            )));
        }
        if surface.format != SURFACE_FORMAT {
            return Err(Error::Precondition(format!(
                "surface format {:?} is not {:?}",
                surface.format, SURFACE_FORMAT
            )));
        }

        Ok(fb)
    }

    /// Deregister deferred framebuffers that are no longer on screen.
    fn release_replaced(&mut self) {
        let presented = self.presented;
        let device = &self.device;
        self.pending_release.retain(|&fb| {
            if Some(fb) == presented {
                return true;
            }
            if let Err(e) = device.remove_framebuffer(fb) {
                warn!("Failed to release framebuffer {:?}: {}", fb, e);
            }
            false
        });
    }

    fn program_cursor(&mut self) -> io::Result<()> {
        let crtc = self.output.crtc_id();

        if let Some(cursor) = self.output.cursor {
            self.device.set_cursor(crtc, Some(&cursor.image()))?;
            let (x, y) = self.session.cursor_position;
            self.device.move_cursor(crtc, clamp_i32(x), clamp_i32(y))?;
        } else if self.cursor_disable_pending {
            self.device.set_cursor(crtc, None)?;
            self.cursor_disable_pending = false;
        }

        Ok(())
    }

    /// Turn the output off and drop every framebuffer it holds.
    pub fn disable(&mut self) -> Result<()> {
        let crtc = self.output.crtc_id();
        if self.presented.is_some() {
            self.device
                .disable_crtc(crtc)
                .map_err(|source| Error::Device {
                    context: "CRTC disable",
                    source,
                })?;
        }
        self.presented = None;

        let mut framebuffers = std::mem::take(&mut self.pending_release);
        framebuffers.extend(self.output.fb.take());
        framebuffers.dedup();
        for fb in framebuffers {
            if let Err(e) = self.device.remove_framebuffer(fb) {
                warn!("Failed to release framebuffer {:?}: {}", fb, e);
            }
        }

        if let Some(cursor) = self.output.cursor.take() {
            self.close_handle(cursor.handle);
        }
        self.cursor_disable_pending = false;
        self.state = ScanoutState::Idle;
        info!("Scanout disabled on CRTC {:?}", crtc);

        Ok(())
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
