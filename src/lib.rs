// Cherry RGB Keyboard Linux Driver - Shared Library
// Device database, logging setup and session helpers

pub mod device_loader;

pub use device_loader::{DatabaseError, DeviceDatabase, JsonDeviceDefinition};

pub use cherry_keyboard::{
    Brightness, CherryCatalogue, CustomKeyLeds, DeviceState, Keyboard, KeyboardError,
    LightingMode, Rgb, Speed,
};
pub use cherry_transport::{HidDiscovery, ProtocolError, ReportMode, Transport, TransportError};

use anyhow::{anyhow, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` directives are added on top of
/// `default_directive` (e.g. "cherry_transport=debug")
pub fn init_logging(default_directive: &str) -> anyhow::Result<()> {
    let directive = default_directive
        .parse()
        .with_context(|| format!("invalid log directive {default_directive:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Start a session on an already opened transport, picking the catalogue
/// from the device's VID/PID
pub fn open_session(
    db: &DeviceDatabase,
    transport: Box<dyn Transport>,
) -> anyhow::Result<Keyboard<CherryCatalogue>> {
    let info = transport.device_info();
    let (vid, pid) = (info.vid, info.pid);
    let definition = db
        .find_by_vid_pid(vid, pid)
        .into_iter()
        .next()
        .ok_or_else(|| KeyboardError::NotFound(format!("no definition for {vid:04X}:{pid:04X}")))?;

    let capability = db
        .capability_for(definition)
        .with_context(|| format!("building descriptor for {}", definition.display_name))?;
    let catalogue = CherryCatalogue::with_capability(capability)?;
    let keyboard = Keyboard::new(transport, catalogue)?;

    info!(
        "Session ready for {} ({:04X}:{:04X})",
        definition.display_name, vid, pid
    );
    Ok(keyboard)
}

/// Discover the first connected keyboard listed in `db` and open a session
pub fn connect(db: &DeviceDatabase) -> anyhow::Result<Keyboard<CherryCatalogue>> {
    let mut discovery = HidDiscovery::empty();
    for device in db.all_devices() {
        discovery.add_device(device.vid, device.pid, device.interface);
    }

    let devices = discovery.list_devices().context("listing HID devices")?;
    let device = devices
        .first()
        .ok_or_else(|| TransportError::DeviceNotFound("no supported keyboard connected".into()))?;

    let report_size = db
        .find_by_vid_pid(device.info.vid, device.info.pid)
        .into_iter()
        .next()
        .map(|definition| db.capability_for(definition))
        .transpose()?
        .map_or(cherry_keyboard::cherry::REPORT_SIZE, |cap| cap.report_size);

    let transport = discovery
        .open_device(device, ReportMode::Output, report_size)
        .with_context(|| format!("opening {}", device.info.device_path))?;
    open_session(db, Box::new(transport))
}
