//! Register channel abstraction
//!
//! The control engine talks to the inverter only through [`RegisterChannel`].
//! Implementations provide raw holding-register access; named reads and
//! writes are layered on top using the register map in [`crate::registers`].

use crate::registers::{RegisterName, RegisterValue};
use thiserror::Error;

/// Function codes at or above this value mark a Modbus exception reply
pub const EXCEPTION_FUNCTION_CODE: u8 = 0x80;

/// Function code of a successful "write multiple registers" reply
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Fault reported by a register channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    InvalidResponse(String),

    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// The device answered with a protocol exception
    #[error("device exception: {0}")]
    Exception(String),
}

impl Fault {
    /// Whether repeating the same request may succeed. Every transport and
    /// framing fault qualifies; an explicit device exception does not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Fault::Exception(_))
    }
}

/// Reply to a register write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Function code of the reply; `>= 0x80` means the device refused
    pub function_code: u8,

    /// Exception description when the device refused
    pub exception: Option<String>,
}

impl WriteAck {
    /// Successful write acknowledgement
    pub fn accepted() -> Self {
        Self {
            function_code: WRITE_MULTIPLE_REGISTERS,
            exception: None,
        }
    }

    /// Exception reply to a write
    pub fn exception<S: Into<String>>(message: S) -> Self {
        Self {
            function_code: WRITE_MULTIPLE_REGISTERS | EXCEPTION_FUNCTION_CODE,
            exception: Some(message.into()),
        }
    }

    pub fn is_exception(&self) -> bool {
        self.function_code >= EXCEPTION_FUNCTION_CODE
    }
}

/// Transport for reading and writing inverter registers.
///
/// Requests are issued strictly one at a time through `&mut self`.
#[async_trait::async_trait]
pub trait RegisterChannel: Send {
    async fn connect(&mut self) -> Result<(), Fault>;

    /// Release the connection. Never fails; errors are only logged.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    async fn read_holding_registers(&mut self, address: u16, count: u16)
    -> Result<Vec<u16>, Fault>;

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<WriteAck, Fault>;

    /// Read a named control register
    async fn read(&mut self, register: RegisterName) -> Result<RegisterValue, Fault> {
        let words = self
            .read_holding_registers(register.address(), register.kind().word_count())
            .await?;
        register
            .decode(&words)
            .map_err(|e| Fault::InvalidResponse(e.to_string()))
    }

    /// Write a named control register
    async fn write(
        &mut self,
        register: RegisterName,
        value: RegisterValue,
    ) -> Result<WriteAck, Fault> {
        let words = register.encode(value);
        self.write_multiple_registers(register.address(), &words)
            .await
    }
}
