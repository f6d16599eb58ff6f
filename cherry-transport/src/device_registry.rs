//! Device registry - USB identities of supported keyboards
//!
//! Only the USB identity lives here. Protocol parameters come from the
//! keyboard family's capability descriptor.

/// Cherry GmbH vendor ID
pub const CHERRY_VID: u16 = 0x046A;

/// G80-3000N RGB TKL
pub const G80_3000N_RGB_TKL_PID: u16 = 0x00DD;

/// Interface carrying the vendor lighting protocol (interface 0 is the boot keyboard)
pub const VENDOR_INTERFACE: i32 = 1;

/// A keyboard the driver knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub vid: u16,
    pub pid: u16,
    pub interface: i32,
    pub name: &'static str,
}

/// Devices matched by discovery when no explicit list is given
pub const KNOWN_DEVICES: &[KnownDevice] = &[KnownDevice {
    vid: CHERRY_VID,
    pid: G80_3000N_RGB_TKL_PID,
    interface: VENDOR_INTERFACE,
    name: "G80-3000N RGB TKL",
}];

/// Look up a known device by VID/PID
pub fn find_known_device(vid: u16, pid: u16) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES.iter().find(|d| d.vid == vid && d.pid == pid)
}

/// Check if VID/PID belongs to a supported keyboard
#[inline]
pub fn is_known_device(vid: u16, pid: u16) -> bool {
    find_known_device(vid, pid).is_some()
}
