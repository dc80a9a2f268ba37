//! KMS device backed by a DRM card node
//!
//! Wraps an open `/dev/dri/card*` file and implements [`KmsDevice`] on top of
//! the `drm` crate's ioctl wrappers.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::Path;

use drm::buffer;
use drm::control::{
    connector, crtc, encoder, framebuffer, Device as ControlDevice, FbCmd2Flags, Mode,
};
use drm::{ClientCapability, Device as BasicDevice};
use tracing::{debug, info};

use crate::kms::{ConnectorInfo, CursorImage, EncoderInfo, FramebufferDesc, KmsDevice, Resources};
use crate::{Error, Result};

/// An open DRM card node
pub struct DrmCard {
    file: File,
}

impl AsFd for DrmCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for DrmCard {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl BasicDevice for DrmCard {}
impl ControlDevice for DrmCard {}

impl DrmCard {
    /// Open a card node read/write
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening DRM device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|source| Error::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let card = Self { file };
        match card.get_driver() {
            Ok(driver) => info!(
                "DRM driver: {} ({})",
                driver.name().to_string_lossy(),
                driver.description().to_string_lossy()
            ),
            Err(e) => debug!("Could not query DRM driver: {}", e),
        }

        Ok(card)
    }
}

impl KmsDevice for DrmCard {
    fn enable_universal_planes(&self) -> io::Result<()> {
        self.set_client_capability(ClientCapability::UniversalPlanes, true)
    }

    fn resources(&self) -> io::Result<Resources> {
        let res = self.resource_handles()?;
        debug!(
            "DRM resources: connectors={}, crtcs={}, encoders={}",
            res.connectors().len(),
            res.crtcs().len(),
            res.encoders().len()
        );
        Ok(Resources {
            connectors: res.connectors().to_vec(),
            crtcs: res.crtcs().to_vec(),
        })
    }

    fn connector(&self, handle: connector::Handle) -> io::Result<ConnectorInfo> {
        let info = ControlDevice::get_connector(self, handle, true)?;
        Ok(ConnectorInfo {
            handle,
            name: format!("{:?}-{}", info.interface(), info.interface_id()),
            state: info.state(),
            modes: info.modes().to_vec(),
            encoders: info.encoders().to_vec(),
            current_encoder: info.current_encoder(),
        })
    }

    fn encoder(&self, handle: encoder::Handle) -> io::Result<EncoderInfo> {
        let info = ControlDevice::get_encoder(self, handle)?;
        let res = self.resource_handles()?;
        let allowed = res.filter_crtcs(info.possible_crtcs());

        let possible_crtcs = res
            .crtcs()
            .iter()
            .enumerate()
            .filter(|(_, crtc)| allowed.contains(*crtc))
            .fold(0u32, |mask, (i, _)| mask | (1 << i));

        Ok(EncoderInfo {
            handle,
            crtc: info.crtc(),
            possible_crtcs,
        })
    }

    fn import_buffer(&self, fd: BorrowedFd<'_>) -> io::Result<buffer::Handle> {
        self.prime_fd_to_buffer(fd)
    }

    fn close_buffer(&self, handle: buffer::Handle) -> io::Result<()> {
        ControlDevice::close_buffer(self, handle)
    }

    fn add_framebuffer(&self, desc: &FramebufferDesc) -> io::Result<framebuffer::Handle> {
        let fb = self.add_planar_framebuffer(desc, FbCmd2Flags::MODIFIERS)?;
        debug!(
            "Created framebuffer {:?}: {}x{} format={:?} pitch={}",
            fb, desc.width, desc.height, desc.format, desc.pitch
        );
        Ok(fb)
    }

    fn remove_framebuffer(&self, fb: framebuffer::Handle) -> io::Result<()> {
        self.destroy_framebuffer(fb)?;
        debug!("Removed framebuffer {:?}", fb);
        Ok(())
    }

    fn set_crtc(
        &self,
        crtc: crtc::Handle,
        fb: framebuffer::Handle,
        connector: connector::Handle,
        mode: &Mode,
    ) -> io::Result<()> {
        ControlDevice::set_crtc(self, crtc, Some(fb), (0, 0), &[connector], Some(*mode))
    }

    fn disable_crtc(&self, crtc: crtc::Handle) -> io::Result<()> {
        ControlDevice::set_crtc(self, crtc, None, (0, 0), &[], None)
    }

    // Legacy cursor ioctls; the output is never driven through atomic commits.
    #[allow(deprecated)]
    fn set_cursor(&self, crtc: crtc::Handle, image: Option<&CursorImage>) -> io::Result<()> {
        match image {
            Some(image) => self.set_cursor2(crtc, Some(image), image.hotspot),
            None => self.set_cursor2::<CursorImage>(crtc, None, (0, 0)),
        }
    }

    #[allow(deprecated)]
    fn move_cursor(&self, crtc: crtc::Handle, x: i32, y: i32) -> io::Result<()> {
        ControlDevice::move_cursor(self, crtc, (x, y))
    }
}
