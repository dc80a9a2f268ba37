//! Mode selection

use drm::control::Mode;

/// Pick a mode for a `width`x`height` framebuffer.
///
/// Returns the first mode, in listed order, that is no larger than the
/// framebuffer in either dimension and whose area does not exceed the
/// framebuffer's. This is a first fit, not a closest fit: an earlier small
/// mode wins over a later exact match.
pub fn choose_mode(modes: &[Mode], width: u32, height: u32) -> Option<Mode> {
    let area = u64::from(width) * u64::from(height);

    modes.iter().copied().find(|mode| {
        let (hdisplay, vdisplay) = mode.size();
        let (hdisplay, vdisplay) = (u32::from(hdisplay), u32::from(vdisplay));

        width >= hdisplay
            && height >= vdisplay
            && area >= u64::from(hdisplay) * u64::from(vdisplay)
    })
}
