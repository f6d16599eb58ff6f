//! HID Wired transport implementation for direct USB connection

use std::time::Duration;

use hidapi::HidDevice;
use tracing::debug;

use crate::error::TransportError;
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// Which HID report type carries the vendor protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Output reports out, interrupt input reports back
    #[default]
    Output,
    /// `SET_REPORT` / `GET_REPORT` feature reports
    Feature,
}

/// HID transport for wired USB connection
///
/// Every report starts with its report ID, which is also the first byte of
/// the frame header.
pub struct HidWiredTransport {
    device: HidDevice,
    info: TransportDeviceInfo,
    mode: ReportMode,
    report_size: usize,
    /// Feature report fetched by reads in [`ReportMode::Feature`]
    report_id: u8,
}

impl HidWiredTransport {
    pub fn new(
        device: HidDevice,
        info: TransportDeviceInfo,
        mode: ReportMode,
        report_size: usize,
    ) -> Self {
        Self {
            device,
            info,
            mode,
            report_size,
            report_id: 0,
        }
    }

    /// Set the report ID requested by feature report reads
    pub fn with_report_id(mut self, report_id: u8) -> Self {
        self.report_id = report_id;
        self
    }

    fn check_len(&self, actual: usize) -> Result<(), TransportError> {
        if actual < self.report_size {
            return Err(TransportError::ShortTransfer {
                expected: self.report_size,
                actual,
            });
        }
        Ok(())
    }
}

impl Transport for HidWiredTransport {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        match self.mode {
            ReportMode::Output => {
                let written = self.device.write(report)?;
                self.check_len(written)
            }
            ReportMode::Feature => {
                self.device.send_feature_report(report)?;
                Ok(())
            }
        }
    }

    fn read_report(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; self.report_size];
        let read = match self.mode {
            ReportMode::Output => {
                let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
                self.device.read_timeout(&mut buf, millis)?
            }
            ReportMode::Feature => {
                buf[0] = self.report_id;
                self.device.get_feature_report(&mut buf)?
            }
        };

        if read == 0 {
            return Err(TransportError::Timeout);
        }
        if read < self.report_size {
            debug!("Short read: {} of {} bytes", read, self.report_size);
        }
        self.check_len(read)?;
        Ok(buf)
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}
