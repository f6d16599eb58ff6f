//! High-level keyboard interface for Cherry RGB keyboards
//!
//! [`Keyboard`] pairs a transaction engine with a device family's command
//! catalogue. [`Keyboard::execute`] is the single entry point; the lighting
//! helpers on `Keyboard<CherryCatalogue>` are sequences of `execute` calls.

pub mod catalogue;
pub mod cherry;
pub mod error;
pub mod led;

pub use catalogue::{Command, CommandCatalogue};
pub use cherry::{CherryCatalogue, CherryOperation, LogicalResponse};
pub use error::KeyboardError;
pub use led::{Brightness, CustomKeyLeds, LedAnimation, LightingMode, Rgb, Speed};

use cherry_transport::{TransactionEngine, Transport, TransportDeviceInfo};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::cherry::{cmd, ANIMATION_COMMIT_OFFSET};

/// A device session: one engine, one catalogue
pub struct Keyboard<C: CommandCatalogue> {
    engine: TransactionEngine,
    catalogue: C,
}

impl<C: CommandCatalogue> Keyboard<C> {
    /// Create a session over `transport` using the catalogue's capability
    pub fn new(transport: Box<dyn Transport>, catalogue: C) -> Result<Self, KeyboardError> {
        let engine = TransactionEngine::new(transport, catalogue.capability())?;
        Ok(Self { engine, catalogue })
    }

    /// Get the transaction engine, e.g. to override retry budget or timeout
    pub fn engine_mut(&mut self) -> &mut TransactionEngine {
        &mut self.engine
    }

    pub fn catalogue(&self) -> &C {
        &self.catalogue
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.engine.device_info()
    }

    /// Run one logical operation
    pub fn execute(&mut self, op: &C::Operation) -> Result<C::Output, KeyboardError> {
        let command = self.catalogue.encode(op)?;
        let response = self.engine.transact(&command.request(), &self.catalogue)?;
        if response.retries > 0 {
            debug!(
                "Opcode 0x{:02X} completed after {} retries",
                command.opcode, response.retries
            );
        }
        self.catalogue.interpret(op, response)
    }
}

/// Raw replies collected by [`Keyboard::fetch_device_state`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// Reply to the `0x03 [0x22]` status query
    pub status_reply: Vec<u8>,
    /// Replies to the custom color table page reads, in offset order
    pub color_pages: Vec<Vec<u8>>,
    /// Replies to the per-key table page reads, in offset order
    pub key_pages: Vec<Vec<u8>>,
}

/// Bytes in the one-byte-per-key table
const KEY_TABLE_SIZE: usize = CustomKeyLeds::TOTAL_KEYS;

impl Keyboard<CherryCatalogue> {
    /// Open a session on a G80 keyboard with the default descriptor
    pub fn cherry(transport: Box<dyn Transport>) -> Result<Self, KeyboardError> {
        Self::new(transport, CherryCatalogue::new())
    }

    pub fn begin_transaction(&mut self) -> Result<(), KeyboardError> {
        self.execute(&CherryOperation::BeginTransaction)?;
        Ok(())
    }

    pub fn end_transaction(&mut self) -> Result<(), KeyboardError> {
        self.execute(&CherryOperation::EndTransaction)?;
        Ok(())
    }

    /// Switch to a built-in animation
    pub fn set_led_animation(
        &mut self,
        mode: LightingMode,
        brightness: Brightness,
        speed: Speed,
        color: Rgb,
        rainbow: bool,
    ) -> Result<(), KeyboardError> {
        info!(
            "Setting animation {} ({}, {})",
            mode.name(),
            brightness.name(),
            speed.name()
        );
        let animation = LedAnimation::new(mode, brightness, speed, color, rainbow);

        self.begin_transaction()?;
        self.execute(&CherryOperation::WriteAnimation {
            offset: 0,
            data: animation.as_bytes().to_vec(),
        })?;
        self.execute(&CherryOperation::WriteAnimation {
            offset: ANIMATION_COMMIT_OFFSET,
            data: vec![0x01],
        })?;
        self.end_transaction()
    }

    /// Switch to custom mode and upload a per-key color table
    pub fn set_custom_colors(&mut self, key_leds: &CustomKeyLeds) -> Result<(), KeyboardError> {
        self.set_led_animation(
            LightingMode::Custom,
            Brightness::Full,
            Speed::Slow,
            Rgb::default(),
            false,
        )?;

        for (offset, chunk) in key_leds.chunks() {
            self.execute(&CherryOperation::WriteCustomLeds {
                offset,
                data: chunk.to_vec(),
            })?;
        }
        Ok(())
    }

    /// Clear the custom color table back to its default
    pub fn reset_custom_colors(&mut self) -> Result<(), KeyboardError> {
        self.set_custom_colors(&CustomKeyLeds::new())?;

        for arg in [0x01, 0x19] {
            self.execute(&CherryOperation::Raw {
                opcode: cmd::UNKNOWN_05,
                payload: vec![arg],
            })?;
        }
        Ok(())
    }

    /// Read the color and key tables
    ///
    /// The reply format is undocumented, so replies are returned as-is.
    pub fn fetch_device_state(&mut self) -> Result<DeviceState, KeyboardError> {
        self.begin_transaction()?;

        let status_reply = self.read(CherryOperation::Raw {
            opcode: cmd::UNKNOWN_03,
            payload: vec![0x22],
        })?;
        let color_pages = self.read_pages(
            cmd::READ_CUSTOM_LED,
            CustomKeyLeds::TOTAL_KEYS * 3,
            CustomKeyLeds::CHUNK_SIZE,
        )?;
        let key_pages = self.read_pages(
            cmd::READ_KEY_TABLE,
            KEY_TABLE_SIZE,
            CustomKeyLeds::CHUNK_SIZE,
        )?;

        self.end_transaction()?;
        Ok(DeviceState {
            status_reply,
            color_pages,
            key_pages,
        })
    }

    fn read(&mut self, op: CherryOperation) -> Result<Vec<u8>, KeyboardError> {
        self.execute(&op)?.into_data().ok_or_else(|| {
            KeyboardError::UnexpectedResponse(format!("no data returned for {op:?}"))
        })
    }

    /// Read `total` bytes in pages of `page` bytes
    fn read_pages(
        &mut self,
        opcode: u8,
        total: usize,
        page: usize,
    ) -> Result<Vec<Vec<u8>>, KeyboardError> {
        (0..total)
            .step_by(page)
            .map(|offset| {
                let len = page.min(total - offset);
                self.read(CherryOperation::ReadPaged {
                    opcode,
                    offset: offset as u16,
                    len: len as u8,
                })
            })
            .collect()
    }
}
