//! Resource binding
//!
//! Picks the display path for a session: the first connected connector and a
//! CRTC able to drive it.

use drm::control::crtc;
use tracing::{debug, info, warn};

use crate::kms::{ConnectorInfo, KmsDevice, Resources};
use crate::output::Output;
use crate::{Error, Result};

/// Bind the first connected connector of `device` to a compatible CRTC.
pub fn bind<D: KmsDevice + ?Sized>(device: &D) -> Result<Output> {
    device
        .enable_universal_planes()
        .map_err(|source| Error::Device {
            context: "universal planes client capability",
            source,
        })?;

    let resources = device.resources().map_err(|source| Error::Device {
        context: "resource enumeration",
        source,
    })?;

    let connector = find_connected_connector(device, &resources).ok_or(Error::NoOutput)?;
    info!(
        "Found connected display {} with {} modes",
        connector.name,
        connector.modes.len()
    );

    let crtc = find_crtc_for_connector(device, &resources, &connector)
        .ok_or_else(|| Error::NoCrtc(connector.name.clone()))?;
    info!("Using CRTC {:?} for {}", crtc, connector.name);

    Ok(Output::new(connector, crtc))
}

fn find_connected_connector<D: KmsDevice + ?Sized>(
    device: &D,
    resources: &Resources,
) -> Option<ConnectorInfo> {
    resources
        .connectors
        .iter()
        .filter_map(|&handle| match device.connector(handle) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Skipping connector {:?}: {}", handle, e);
                None
            }
        })
        .find(ConnectorInfo::is_connected)
}

/// Find a CRTC for `connector`.
///
/// A CRTC already wired to the connector's current encoder is taken as soon as
/// it is seen, as is any possible CRTC when the connector was never bound to
/// an encoder. Failing that, the last possible CRTC seen across all encoders
/// is used.
pub fn find_crtc_for_connector<D: KmsDevice + ?Sized>(
    device: &D,
    resources: &Resources,
    connector: &ConnectorInfo,
) -> Option<crtc::Handle> {
    let mut candidate = None;

    for &handle in &connector.encoders {
        let encoder = match device.encoder(handle) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!("Skipping encoder {:?}: {}", handle, e);
                continue;
            }
        };

        for (index, &crtc) in resources.crtcs.iter().enumerate() {
            if !encoder.can_drive(index) {
                continue;
            }

            let Some(current) = connector.current_encoder else {
                return Some(crtc);
            };
            if current == encoder.handle && encoder.crtc == Some(crtc) {
                debug!("Keeping existing pairing {:?} -> {:?}", encoder.handle, crtc);
                return Some(crtc);
            }

            candidate = Some(crtc);
        }
    }

    candidate
}
