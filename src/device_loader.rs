// Device Loader - device definitions from the embedded devices.json

use std::collections::HashMap;

use cherry_keyboard::{cherry, KeyboardError};
use cherry_transport::device_registry::VENDOR_INTERFACE;
use cherry_transport::Capability;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Device definitions shipped with the driver
const EMBEDDED_DEVICES: &str = include_str!("../data/devices.json");

/// Errors loading the device database
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to parse device database: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Device definition loaded from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonDeviceDefinition {
    pub vid: u16,
    pub pid: u16,
    /// HID interface carrying the lighting protocol
    #[serde(default = "default_interface")]
    pub interface: i32,
    pub name: String,
    pub display_name: String,
    /// Command catalogue family, e.g. "cherry-g80"
    pub family: String,
    /// Per-device retry budget override
    #[serde(default)]
    pub retry_budget: Option<u32>,
    /// Per-device response timeout override
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_interface() -> i32 {
    VENDOR_INTERFACE
}

/// Wrapper for the versioned devices.json format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonDeviceFile {
    version: u32,
    devices: Vec<JsonDeviceDefinition>,
}

/// Device database loaded from JSON
#[derive(Debug, Default)]
pub struct DeviceDatabase {
    devices: Vec<JsonDeviceDefinition>,
    /// (VID, PID) -> indices into `devices`
    devices_by_vid_pid: HashMap<(u16, u16), Vec<usize>>,
    version: u32,
}

impl DeviceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the definitions embedded in the driver
    pub fn load_default() -> Result<Self, DatabaseError> {
        let db = Self::load_from_json(EMBEDDED_DEVICES)?;
        debug!(
            "Loaded embedded device database ({} devices, version {})",
            db.len(),
            db.version
        );
        Ok(db)
    }

    /// Load devices from a JSON string
    /// Accepts the versioned format or a bare array of definitions
    pub fn load_from_json(json: &str) -> Result<Self, DatabaseError> {
        let mut db = Self::new();
        let devices = match serde_json::from_str::<JsonDeviceFile>(json) {
            Ok(file) => {
                db.version = file.version;
                file.devices
            }
            Err(_) => serde_json::from_str::<Vec<JsonDeviceDefinition>>(json)?,
        };
        for device in devices {
            db.add_device(device);
        }
        Ok(db)
    }

    pub fn add_device(&mut self, device: JsonDeviceDefinition) {
        let index = self.devices.len();
        self.devices_by_vid_pid
            .entry((device.vid, device.pid))
            .or_default()
            .push(index);
        self.devices.push(device);
    }

    /// Find all devices with matching VID/PID
    pub fn find_by_vid_pid(&self, vid: u16, pid: u16) -> Vec<&JsonDeviceDefinition> {
        self.devices_by_vid_pid
            .get(&(vid, pid))
            .map(|indices| indices.iter().filter_map(|&i| self.devices.get(i)).collect())
            .unwrap_or_default()
    }

    /// Capability descriptor for a device: its family's descriptor with the
    /// device's overrides applied
    pub fn capability_for(
        &self,
        definition: &JsonDeviceDefinition,
    ) -> Result<Capability, KeyboardError> {
        let mut capability = match definition.family.as_str() {
            cherry::FAMILY => cherry::capability(),
            other => {
                warn!("Device {} uses unknown family {:?}", definition.name, other);
                return Err(KeyboardError::NotFound(format!(
                    "no command catalogue for family {other:?}"
                )));
            }
        };

        if let Some(budget) = definition.retry_budget {
            capability.retry_budget = budget;
        }
        if let Some(timeout_ms) = definition.timeout_ms {
            capability.timeout_ms = timeout_ms;
        }
        capability.validate()?;
        Ok(capability)
    }

    pub fn all_devices(&self) -> impl Iterator<Item = &JsonDeviceDefinition> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}
