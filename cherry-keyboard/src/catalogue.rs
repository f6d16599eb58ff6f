//! Command catalogue interface
//!
//! A catalogue maps a device family's logical operations onto wire commands
//! and back. It also supplies the family's capability descriptor and
//! classifies status codes for the transaction engine.

use std::sync::Arc;

use cherry_transport::{Capability, Request, Response, ResponseShape, StatusPolicy};

use crate::error::KeyboardError;

/// One encoded logical operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: u8,
    pub payload: Vec<u8>,
    pub shape: ResponseShape,
}

impl Command {
    /// A command answered by a plain acknowledgement
    pub fn ack(opcode: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
            shape: ResponseShape::Ack,
        }
    }

    /// A command answered with data
    pub fn data(opcode: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
            shape: ResponseShape::Data(Default::default()),
        }
    }

    pub fn request(&self) -> Request<'_> {
        Request {
            opcode: self.opcode,
            payload: &self.payload,
            shape: self.shape,
        }
    }
}

/// Static description of a device family's command set
pub trait CommandCatalogue: StatusPolicy {
    /// Logical operation with its arguments
    type Operation;
    /// Typed result of an operation
    type Output;

    /// Protocol parameters for this family
    fn capability(&self) -> Arc<Capability>;

    /// Turn an operation into opcode, payload and expected response shape
    fn encode(&self, op: &Self::Operation) -> Result<Command, KeyboardError>;

    /// Map a completed response back to the operation's result
    fn interpret(&self, op: &Self::Operation, response: Response)
        -> Result<Self::Output, KeyboardError>;
}
