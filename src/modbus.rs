//! Modbus TCP register channel for SolarEdge inverters
//!
//! This module provides async Modbus TCP communication with the inverter's
//! storage control and battery register blocks, with per-request timeouts
//! and classification of failures into channel [`Fault`]s.

use crate::channel::{Fault, RegisterChannel, WriteAck};
use crate::config::ModbusConfig;
use crate::error::{EquinoxError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

/// Modbus TCP channel to one inverter unit
pub struct ModbusChannel {
    /// Modbus TCP client connection
    client: Option<tokio_modbus::client::Context>,

    /// Configuration
    config: ModbusConfig,

    /// Connection and operation timeout
    timeout: Duration,

    /// Logger
    logger: StructuredLogger,
}

impl ModbusChannel {
    /// Create a new, unconnected channel
    pub fn new(config: &ModbusConfig) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("modbus")
                .with_device(format!("{}:{}", config.host, config.port))
                .with_field("unit", config.unit.to_string()),
        );
        Self {
            client: None,
            config: config.clone(),
            timeout: config.timeout(),
            logger,
        }
    }

    fn request_timeout(&mut self) -> Fault {
        // A late reply would be read as the answer to the next request
        self.logger
            .warn("Request timed out, dropping connection");
        self.client = None;
        Fault::Timeout
    }

    /// Get client reference or fault if not connected
    fn get_client(&mut self) -> std::result::Result<&mut tokio_modbus::client::Context, Fault> {
        self.client.as_mut().ok_or(Fault::NotConnected)
    }

    /// Map a transport error and drop the connection when it is no longer usable
    fn transport_fault(&mut self, err: tokio_modbus::Error) -> Fault {
        match err {
            tokio_modbus::Error::Transport(e) => {
                if e.kind() == std::io::ErrorKind::Unsupported {
                    Fault::Unsupported(e.to_string())
                } else {
                    // The socket is in an unknown state; force a reconnect
                    self.client = None;
                    Fault::Transport(e.to_string())
                }
            }
            tokio_modbus::Error::Protocol(e) => {
                // Framing is out of step with the server
                self.client = None;
                Fault::InvalidResponse(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl RegisterChannel for ModbusChannel {
    async fn connect(&mut self) -> std::result::Result<(), Fault> {
        let socket_addr = resolve_address(self.config.host.clone(), self.config.port).await?;

        self.logger
            .info(&format!("Connecting to Modbus server at {}", socket_addr));

        let slave = Slave(self.config.unit);
        match timeout(self.timeout, tcp::connect_slave(socket_addr, slave)).await {
            Ok(Ok(client)) => {
                self.client = Some(client);
                self.logger.debug("Successfully connected to Modbus server");
                Ok(())
            }
            Ok(Err(e)) => {
                let fault = Fault::Connection(e.to_string());
                self.logger
                    .error(&format!("Failed to connect to Modbus server: {}", fault));
                Err(fault)
            }
            Err(_) => {
                self.logger.error("Connection timeout");
                Err(Fault::Timeout)
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut client) = self.client.take() {
            self.logger.info("Disconnecting from Modbus server");
            if let Err(e) = client.disconnect().await {
                self.logger
                    .warn(&format!("Error while disconnecting: {}", e));
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, Fault> {
        let timeout_duration = self.timeout;

        // Log before borrowing client
        self.logger.trace(&format!(
            "Reading {} registers from address 0x{:04X}",
            count, address
        ));

        let client = self.get_client()?;
        let request = client.read_holding_registers(address, count);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(response))) => {
                if response.len() != count as usize {
                    return Err(Fault::InvalidResponse(format!(
                        "Expected {} registers, got {}",
                        count,
                        response.len()
                    )));
                }
                Ok(response)
            }
            Ok(Ok(Err(exception))) => Err(Fault::Exception(exception.to_string())),
            Ok(Err(e)) => Err(self.transport_fault(e)),
            Err(_) => Err(self.request_timeout()),
        }
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> std::result::Result<WriteAck, Fault> {
        let timeout_duration = self.timeout;

        // Log before borrowing client
        self.logger.debug(&format!(
            "Writing {:?} to registers starting at 0x{:04X}",
            values, address
        ));

        let client = self.get_client()?;
        let request = client.write_multiple_registers(address, values);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(()))) => Ok(WriteAck::accepted()),
            Ok(Ok(Err(exception))) => Ok(WriteAck::exception(exception.to_string())),
            Ok(Err(e)) => Err(self.transport_fault(e)),
            Err(_) => Err(self.request_timeout()),
        }
    }
}

async fn resolve_address(host: String, port: u16) -> std::result::Result<SocketAddr, Fault> {
    let mut addrs = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| Fault::Connection(format!("Invalid socket address: {}", e)))?;
    addrs.next().ok_or_else(|| {
        Fault::Connection(format!("Invalid socket address: {} did not resolve", host))
    })
}

// Utility functions for data conversion. SolarEdge storage and battery
// registers put the low word of 32-bit values first.

/// Decode an unsigned 32-bit value from two words, low word first
pub fn decode_u32_le_words(registers: &[u16]) -> Result<u32> {
    match registers {
        [low, high, ..] => Ok((u32::from(*high) << 16) | u32::from(*low)),
        _ => Err(EquinoxError::modbus(
            "Insufficient registers for 32-bit value",
        )),
    }
}

/// Decode a 32-bit float from two words, low word first
pub fn decode_f32_le_words(registers: &[u16]) -> Result<f32> {
    decode_u32_le_words(registers)
        .map(f32::from_bits)
        .map_err(|_| EquinoxError::modbus("Insufficient registers for 32-bit float"))
}

/// Encode an unsigned 32-bit value to two words, low word first
pub fn encode_u32_le_words(value: u32) -> [u16; 2] {
    [(value & 0xFFFF) as u16, (value >> 16) as u16]
}

/// Encode a 32-bit float to two words, low word first
pub fn encode_f32_le_words(value: f32) -> [u16; 2] {
    encode_u32_le_words(value.to_bits())
}

/// Decode a string from registers (two big-endian bytes per word). Unused
/// registers are padded with NUL or 0xFF bytes, both are stripped.
pub fn decode_string(registers: &[u16], max_length: Option<usize>) -> Result<String> {
    let mut bytes = Vec::with_capacity(registers.len() * 2);

    for &reg in registers {
        bytes.extend_from_slice(&reg.to_be_bytes());
    }

    while matches!(bytes.last(), Some(0x00 | 0xFF)) {
        bytes.pop();
    }

    let string = String::from_utf8(bytes)
        .map_err(|e| EquinoxError::modbus(format!("Invalid UTF-8 string: {}", e)))?;

    let string = string.trim_matches('\0').trim();

    if let Some(max_len) = max_length {
        Ok(string.chars().take(max_len).collect())
    } else {
        Ok(string.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_f32_le_words() {
        // 1.0 = 0x3F800000, low word first
        let registers = [0x0000, 0x3F80];
        let result = decode_f32_le_words(&registers).unwrap();
        assert!((result - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_encode_f32_le_words() {
        assert_eq!(encode_f32_le_words(1.0), [0x0000, 0x3F80]);
    }

    #[test]
    fn test_decode_u32_le_words() {
        assert_eq!(decode_u32_le_words(&[0x7080, 0x0000]).unwrap(), 28800);
        assert!(decode_u32_le_words(&[0x7080]).is_err());
    }

    #[test]
    fn test_decode_string_strips_padding() {
        let registers = [0x536F, 0x6C61, 0x7245, 0x6467, 0x6500, 0xFFFF];
        assert_eq!(decode_string(&registers, None).unwrap(), "SolarEdge");
    }

    #[test]
    fn test_modbus_channel_creation() {
        let config = ModbusConfig::default();
        let channel = ModbusChannel::new(&config);
        assert!(!channel.is_connected());
    }
}
