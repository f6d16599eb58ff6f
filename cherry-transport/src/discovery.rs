//! Device discovery for Cherry RGB keyboards

use hidapi::HidApi;
use tracing::{debug, info};

use crate::device_registry::{KnownDevice, KNOWN_DEVICES};
use crate::error::TransportError;
use crate::hid_wired::{HidWiredTransport, ReportMode};
use crate::types::{DiscoveredDevice, TransportDeviceInfo};

/// HID device discovery for wired keyboards
pub struct HidDiscovery {
    /// Known (VID, PID, interface) triples to look for
    known_devices: Vec<(u16, u16, i32)>,
}

impl Default for HidDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HidDiscovery {
    /// Create a discovery instance matching every registered keyboard
    pub fn new() -> Self {
        Self {
            known_devices: KNOWN_DEVICES
                .iter()
                .map(|d: &KnownDevice| (d.vid, d.pid, d.interface))
                .collect(),
        }
    }

    /// Create a discovery instance that matches nothing until devices are added
    pub fn empty() -> Self {
        Self {
            known_devices: Vec::new(),
        }
    }

    /// Add a VID/PID/interface triple to discover
    pub fn add_device(&mut self, vid: u16, pid: u16, interface: i32) {
        if !self.is_known_device(vid, pid, interface) {
            self.known_devices.push((vid, pid, interface));
        }
    }

    fn is_known_device(&self, vid: u16, pid: u16, interface: i32) -> bool {
        self.known_devices.contains(&(vid, pid, interface))
    }

    /// List currently connected devices on their vendor interface
    pub fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = HidApi::new()?;
        let mut devices = Vec::new();

        for device_info in api.device_list() {
            let vid = device_info.vendor_id();
            let pid = device_info.product_id();
            let interface = device_info.interface_number();

            if !self.is_known_device(vid, pid, interface) {
                continue;
            }

            let path = device_info.path().to_string_lossy().to_string();
            debug!(
                "Found device: VID={:04X} PID={:04X} interface={} path={}",
                vid, pid, interface, path
            );

            devices.push(DiscoveredDevice {
                info: TransportDeviceInfo {
                    vid,
                    pid,
                    interface,
                    device_path: path,
                    serial: device_info.serial_number().map(|s| s.to_string()),
                    product_name: device_info.product_string().map(|s| s.to_string()),
                },
            });
        }

        info!("Found {} devices", devices.len());
        Ok(devices)
    }

    /// Open a discovered device
    pub fn open_device(
        &self,
        device: &DiscoveredDevice,
        mode: ReportMode,
        report_size: usize,
    ) -> Result<HidWiredTransport, TransportError> {
        let api = HidApi::new()?;
        let path = std::ffi::CString::new(device.info.device_path.as_str())
            .map_err(|e| TransportError::DeviceNotFound(e.to_string()))?;
        let hid = api.open_path(&path)?;

        info!(
            "Opened {:04X}:{:04X} ({})",
            device.info.vid,
            device.info.pid,
            device.info.product_name.as_deref().unwrap_or("unknown")
        );
        Ok(HidWiredTransport::new(hid, device.info.clone(), mode, report_size))
    }

    /// Open the first matching device
    pub fn open_first(
        &self,
        mode: ReportMode,
        report_size: usize,
    ) -> Result<HidWiredTransport, TransportError> {
        let devices = self.list_devices()?;
        let device = devices.first().ok_or_else(|| {
            TransportError::DeviceNotFound("no supported keyboard connected".to_string())
        })?;
        self.open_device(device, mode, report_size)
    }
}
