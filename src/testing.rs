//! In-memory KMS device and host used by the unit tests

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};

use drm::buffer::{self, DrmFourcc, DrmModifier};
use drm::control::{self, connector, crtc, encoder, framebuffer, Mode, RawResourceHandle};

use crate::kms::{ConnectorInfo, CursorImage, EncoderInfo, FramebufferDesc, KmsDevice, Resources};
use crate::listener::DisplayHost;
use crate::scanout::{DmaBuf, Rect};

pub(crate) fn handle<T: From<RawResourceHandle>>(id: u32) -> T {
    control::from_u32(id).expect("resource ids are non-zero")
}

pub(crate) fn mode(width: u16, height: u16) -> Mode {
    let mut name = [0; 32];
    for (dst, src) in name.iter_mut().zip(format!("{width}x{height}").bytes()) {
        *dst = src as _;
    }

    Mode::from(drm_ffi::drm_mode_modeinfo {
        clock: 148_500,
        hdisplay: width,
        hsync_start: width.saturating_add(88),
        hsync_end: width.saturating_add(132),
        htotal: width.saturating_add(280),
        hskew: 0,
        vdisplay: height,
        vsync_start: height.saturating_add(4),
        vsync_end: height.saturating_add(9),
        vtotal: height.saturating_add(45),
        vscan: 0,
        vrefresh: 60,
        flags: 0,
        type_: drm_ffi::DRM_MODE_TYPE_USERDEF,
        name,
    })
}

pub(crate) fn connector_info(
    id: u32,
    state: connector::State,
    encoders: &[u32],
    current_encoder: Option<u32>,
    modes: Vec<Mode>,
) -> ConnectorInfo {
    ConnectorInfo {
        handle: handle(id),
        name: format!("HDMIA-{id}"),
        state,
        modes,
        encoders: encoders.iter().map(|&id| handle(id)).collect(),
        current_encoder: current_encoder.map(handle),
    }
}

pub(crate) fn encoder_info(id: u32, crtc: Option<u32>, possible_crtcs: u32) -> EncoderInfo {
    EncoderInfo {
        handle: handle(id),
        crtc: crtc.map(handle),
        possible_crtcs,
    }
}

/// A dma-buf descriptor backed by `/dev/null`; the fake never reads the fd.
pub(crate) fn dmabuf(width: u32, height: u32) -> DmaBuf {
    let fd = OwnedFd::from(File::open("/dev/null").expect("open /dev/null"));
    DmaBuf {
        fd,
        width,
        height,
        fourcc: DrmFourcc::Xrgb8888,
        stride: width * 4,
        modifier: DrmModifier::Linear,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    EnableUniversalPlanes,
    ImportBuffer(buffer::Handle),
    CloseBuffer(buffer::Handle),
    AddFramebuffer(framebuffer::Handle),
    RemoveFramebuffer(framebuffer::Handle),
    SetCrtc {
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        connector: connector::Handle,
        size: (u16, u16),
    },
    DisableCrtc(crtc::Handle),
    SetCursor(Option<CursorImage>),
    MoveCursor(i32, i32),
}

/// Records every call and keeps just enough state to check what is on screen.
pub(crate) struct FakeDevice {
    resources: Resources,
    connectors: Vec<ConnectorInfo>,
    encoders: Vec<EncoderInfo>,
    next_id: Cell<u32>,
    live_buffers: RefCell<Vec<buffer::Handle>>,
    live_framebuffers: RefCell<Vec<framebuffer::Handle>>,
    scanout: Cell<Option<(framebuffer::Handle, Mode)>>,
    calls: RefCell<Vec<Call>>,
    pub fail_caps: Cell<bool>,
    pub fail_resources: Cell<bool>,
    pub fail_import: Cell<bool>,
    pub fail_add_framebuffer: Cell<bool>,
    pub fail_remove: Cell<bool>,
    pub fail_set_crtc: Cell<bool>,
    pub fail_cursor: Cell<bool>,
}

impl FakeDevice {
    pub fn new(
        resources: Resources,
        connectors: Vec<ConnectorInfo>,
        encoders: Vec<EncoderInfo>,
    ) -> Self {
        Self {
            resources,
            connectors,
            encoders,
            next_id: Cell::new(100),
            live_buffers: RefCell::new(Vec::new()),
            live_framebuffers: RefCell::new(Vec::new()),
            scanout: Cell::new(None),
            calls: RefCell::new(Vec::new()),
            fail_caps: Cell::new(false),
            fail_resources: Cell::new(false),
            fail_import: Cell::new(false),
            fail_add_framebuffer: Cell::new(false),
            fail_remove: Cell::new(false),
            fail_set_crtc: Cell::new(false),
            fail_cursor: Cell::new(false),
        }
    }

    /// Connector 30 connected through encoder 20, which is wired to CRTC 10.
    pub fn single_output(modes: Vec<Mode>) -> Self {
        Self::new(
            Resources {
                connectors: vec![handle(30)],
                crtcs: vec![handle(10), handle(11)],
            },
            vec![connector_info(30, connector::State::Connected, &[20], Some(20), modes)],
            vec![encoder_info(20, Some(10), 0b11)],
        )
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Buffer handles imported and not yet closed
    pub fn open_buffers(&self) -> Vec<buffer::Handle> {
        self.live_buffers.borrow().clone()
    }

    pub fn is_registered(&self, fb: framebuffer::Handle) -> bool {
        self.live_framebuffers.borrow().contains(&fb)
    }

    /// Framebuffer and mode currently scanned out, if any
    pub fn scanout(&self) -> Option<(framebuffer::Handle, Mode)> {
        self.scanout.get()
    }

    fn next<T: From<RawResourceHandle>>(&self) -> T {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        handle(id)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

fn fail() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

impl KmsDevice for FakeDevice {
    fn enable_universal_planes(&self) -> io::Result<()> {
        if self.fail_caps.get() {
            return Err(fail());
        }
        self.record(Call::EnableUniversalPlanes);
        Ok(())
    }

    fn resources(&self) -> io::Result<Resources> {
        if self.fail_resources.get() {
            return Err(fail());
        }
        Ok(self.resources.clone())
    }

    fn connector(&self, handle: connector::Handle) -> io::Result<ConnectorInfo> {
        self.connectors
            .iter()
            .find(|c| c.handle == handle)
            .cloned()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn encoder(&self, handle: encoder::Handle) -> io::Result<EncoderInfo> {
        self.encoders
            .iter()
            .find(|e| e.handle == handle)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn import_buffer(&self, _fd: BorrowedFd<'_>) -> io::Result<buffer::Handle> {
        if self.fail_import.get() {
            return Err(fail());
        }
        let buffer = self.next();
        self.live_buffers.borrow_mut().push(buffer);
        self.record(Call::ImportBuffer(buffer));
        Ok(buffer)
    }

    fn close_buffer(&self, handle: buffer::Handle) -> io::Result<()> {
        let mut live = self.live_buffers.borrow_mut();
        let Some(index) = live.iter().position(|&b| b == handle) else {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        };
        live.remove(index);
        self.record(Call::CloseBuffer(handle));
        Ok(())
    }

    fn add_framebuffer(&self, _desc: &FramebufferDesc) -> io::Result<framebuffer::Handle> {
        if self.fail_add_framebuffer.get() {
            return Err(fail());
        }
        let fb = self.next();
        self.live_framebuffers.borrow_mut().push(fb);
        self.record(Call::AddFramebuffer(fb));
        Ok(fb)
    }

    fn remove_framebuffer(&self, fb: framebuffer::Handle) -> io::Result<()> {
        if self.fail_remove.get() {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        let mut live = self.live_framebuffers.borrow_mut();
        let Some(index) = live.iter().position(|&f| f == fb) else {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        };
        live.remove(index);
        if matches!(self.scanout.get(), Some((shown, _)) if shown == fb) {
            // The kernel turns the CRTC off when its framebuffer goes away.
            self.scanout.set(None);
        }
        self.record(Call::RemoveFramebuffer(fb));
        Ok(())
    }

    fn set_crtc(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        connector: connector::Handle,
        mode: &Mode,
    ) -> io::Result<()> {
        if self.fail_set_crtc.get() || !self.is_registered(fb) {
            return Err(fail());
        }
        self.scanout.set(Some((fb, *mode)));
        self.record(Call::SetCrtc {
            crtc,
            fb,
            connector,
            size: mode.size(),
        });
        Ok(())
    }

    fn disable_crtc(&self, crtc: crtc::Handle) -> io::Result<()> {
        self.scanout.set(None);
        self.record(Call::DisableCrtc(crtc));
        Ok(())
    }

    fn set_cursor(&self, _crtc: crtc::Handle, image: Option<&CursorImage>) -> io::Result<()> {
        if self.fail_cursor.get() {
            return Err(fail());
        }
        self.record(Call::SetCursor(image.copied()));
        Ok(())
    }

    fn move_cursor(&self, _crtc: crtc::Handle, x: i32, y: i32) -> io::Result<()> {
        if self.fail_cursor.get() {
            return Err(fail());
        }
        self.record(Call::MoveCursor(x, y));
        Ok(())
    }
}

/// Host side of the listener contract, remembering what it was told.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    pub presented: Vec<Rect>,
    pub update_requests: usize,
}

impl DisplayHost for RecordingHost {
    fn notify_presented(&mut self, region: Rect) {
        self.presented.push(region);
    }

    fn request_update(&mut self) {
        self.update_requests += 1;
    }
}
