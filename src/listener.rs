//! Host display framework contract
//!
//! The host calls into a [`DisplayListener`] as consoles change and frames
//! arrive, and is called back through [`DisplayHost`]. Callbacks never fail:
//! a bad frame is logged and dropped so the session keeps running.

use std::rc::Rc;

use drm::control::framebuffer;
use tracing::{debug, error, warn};

use crate::binder::bind;
use crate::config::Config;
use crate::kms::KmsDevice;
use crate::output::Output;
use crate::scanout::{DmaBuf, Rect, ScanoutDriver, Surface};
use crate::Result;

/// Calls from the backend into the host framework
pub trait DisplayHost {
    /// `region` of the console is now on screen.
    fn notify_presented(&mut self, region: Rect);

    /// Ask the guest graphics device to produce a new frame.
    fn request_update(&mut self);
}

/// Events delivered by the host framework to a display backend
pub trait DisplayListener {
    fn name(&self) -> &'static str;

    /// Whether the backend consumes GPU buffers rather than CPU surfaces
    fn needs_gl(&self) -> bool;

    /// Periodic refresh tick
    fn refresh(&mut self);

    /// CPU surface damage. Frames arrive as dma-bufs here, so the default
    /// ignores it.
    fn gfx_update(&mut self, _region: Rect) {}

    fn surface_changed(&mut self, surface: Option<Surface>);

    fn scanout_disable(&mut self);

    fn scanout_dmabuf(&mut self, dmabuf: &DmaBuf);

    fn cursor_dmabuf(&mut self, dmabuf: Option<&DmaBuf>, hotspot: Option<(u32, u32)>);

    fn cursor_position(&mut self, x: u32, y: u32);

    fn release_dmabuf(&mut self, fb: framebuffer::Handle);

    fn flush(&mut self, region: Rect);
}

/// KMS display backend for one host console
pub struct DrmDisplay<D: KmsDevice, H: DisplayHost> {
    driver: ScanoutDriver<D>,
    host: H,
    gl_scanout: bool,
}

impl<D: KmsDevice, H: DisplayHost> DrmDisplay<D, H> {
    /// Bind an output on `device` and attach it to `host`.
    pub fn new(device: Rc<D>, host: H, config: &Config) -> Result<Self> {
        let output = bind(&*device)?;
        Ok(Self::with_output(device, output, host, config))
    }

    /// Drive an already bound output, e.g. one of several heads on the
    /// same device.
    pub fn with_output(device: Rc<D>, output: Output, host: H, config: &Config) -> Self {
        Self {
            driver: ScanoutDriver::new(device, output, config.policy),
            host,
            gl_scanout: config.gl_scanout,
        }
    }

    pub fn driver(&self) -> &ScanoutDriver<D> {
        &self.driver
    }

    pub fn output(&self) -> &Output {
        self.driver.output()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<D: KmsDevice, H: DisplayHost> DisplayListener for DrmDisplay<D, H> {
    fn name(&self) -> &'static str {
        "drm"
    }

    fn needs_gl(&self) -> bool {
        self.gl_scanout
    }

    fn refresh(&mut self) {
        self.host.request_update();
    }

    fn surface_changed(&mut self, surface: Option<Surface>) {
        debug!("Surface changed: {:?}", surface);
        self.driver.set_surface(surface);
    }

    fn scanout_disable(&mut self) {
        if let Err(e) = self.driver.disable() {
            error!("Failed to disable scanout: {}", e);
        }
    }

    fn scanout_dmabuf(&mut self, dmabuf: &DmaBuf) {
        match self.driver.import_primary(dmabuf) {
            Ok(fb) => debug!(
                "Imported {}x{} {:?} dma-buf as {:?}",
                dmabuf.width, dmabuf.height, dmabuf.fourcc, fb
            ),
            Err(e) => warn!("Dropping frame: {}", e),
        }
    }

    fn cursor_dmabuf(&mut self, dmabuf: Option<&DmaBuf>, hotspot: Option<(u32, u32)>) {
        if let Err(e) = self.driver.import_cursor(dmabuf, hotspot) {
            warn!("Dropping cursor image: {}", e);
        }
    }

    fn cursor_position(&mut self, x: u32, y: u32) {
        self.driver.set_cursor_position(x, y);
    }

    fn release_dmabuf(&mut self, fb: framebuffer::Handle) {
        if let Err(e) = self.driver.release(fb) {
            warn!("Failed to release framebuffer {:?}: {}", fb, e);
        }
    }

    fn flush(&mut self, region: Rect) {
        if let Err(e) = self.driver.commit(region, &mut self.host) {
            warn!("Frame not presented: {}", e);
        }
    }
}
