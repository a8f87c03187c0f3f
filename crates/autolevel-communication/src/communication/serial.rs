//! Serial port communication implementation
//!
//! Provides the serial [`Transport`] used to reach a GRBL controller over USB
//! or RS-232, plus port enumeration for picking a default.

use super::{ConnectionParams, SerialParity, Transport};
use autolevel_core::{ConnectionError, Result};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,
}

/// List serial ports that look like CNC controllers
///
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::SerialError {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_cnc_port(&port.port_name))
        .map(|port| SerialPortInfo {
            port_name: port.port_name.clone(),
            description: get_port_description(port),
            manufacturer: match &port.port_type {
                serialport::SerialPortType::UsbPort(usb) => usb.manufacturer.clone(),
                _ => None,
            },
        })
        .collect())
}

/// Check if a port name matches CNC controller patterns
pub fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(num) = port_name.strip_prefix("COM") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Serial port transport backed by the serialport crate
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let invalid = |reason: String| ConnectionError::InvalidParameters { reason };

        if params.port.is_empty() {
            return Err(invalid("no port name given".to_string()).into());
        }
        if params.read_timeout_ms == 0 {
            return Err(invalid("read timeout must be > 0".to_string()).into());
        }

        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(invalid(format!("Invalid data bits: {}", other)).into()),
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => return Err(invalid(format!("Invalid stop bits: {}", other)).into()),
        };

        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.read_timeout_ms))
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
        Ok(Self {
            port: Some(port),
            name: params.port.clone(),
        })
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let port = self.port_mut()?;
        let n = port.write(data)?;
        port.flush()?;
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_mut()?.read(buf)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        // Dropping the handle releases the device
        if self.port.take().is_some() {
            tracing::info!("Closed {}", self.name);
        }
        Ok(())
    }
}
