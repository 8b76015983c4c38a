use crate::terminal::{KeiTerminal, KeiTerminalError};
use serialport::{SerialPortType, UsbPortInfo};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeiDevice {
    pub name: String,
    pub port: String,
    pub serial_number: Option<String>,
}

impl KeiDevice {
    pub fn new(name: String, port: String, serial_number: Option<String>) -> Self {
        Self {
            name,
            port,
            serial_number,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeiConnectorError {
    #[error("Serial terminal error: {0}")]
    Terminal(#[from] KeiTerminalError),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("Port {port} is not a Keithley 615 interface board")]
    InvalidPort { port: String },

    #[error("No interface board {name} found. Please connect one or specify the port manually")]
    DeviceNotFound { name: String },

    #[error("Interface board did not answer after {attempts} attempts")]
    NoResponse { attempts: u32 },
}

pub struct KeiConnector;

impl KeiConnector {
    /// USB vendor/product pairs the board enumerates with.
    const VALID_VENDOR_MODEL_VARIANTS: [(u16, u16); 2] = [(0x2fe3, 0x0100), (0x2fe3, 0x0001)];
    const CONNECT_ATTEMPTS: u32 = 3;

    /// Connect to an interface board, by port or by discovery.
    pub fn connect(name: Option<&str>, port: Option<&str>) -> Result<KeiTerminal, KeiConnectorError> {
        if let Some(port) = port {
            log::debug!("Connecting to interface board on port {}", port);
            Self::validate_port(name, port)?;
            let mut terminal = KeiTerminal::new(port)?;
            terminal.initialize()?;
            Ok(terminal)
        } else {
            Self::get_working_serial(name)
        }
    }

    fn validate_port(name: Option<&str>, port: &str) -> Result<(), KeiConnectorError> {
        let devices = Self::get_available_devices(name)?;

        if !devices.iter().any(|d| d.port == port) {
            return Err(KeiConnectorError::InvalidPort {
                port: port.to_string(),
            });
        }

        Ok(())
    }

    /// Whether a USB serial port belongs to an interface board, optionally
    /// with the given product name.
    pub fn is_interface_board(name: Option<&str>, info: &UsbPortInfo) -> bool {
        let is_valid_variant = Self::VALID_VENDOR_MODEL_VARIANTS
            .iter()
            .any(|&(vid, pid)| info.vid == vid && info.pid == pid);

        if !is_valid_variant {
            return false;
        }

        match name {
            Some(expected) => info.product.as_deref() == Some(expected),
            None => true,
        }
    }

    pub fn get_available_devices(name: Option<&str>) -> Result<Vec<KeiDevice>, KeiConnectorError> {
        let devices = serialport::available_ports()?
            .into_iter()
            .filter_map(|port| match port.port_type {
                SerialPortType::UsbPort(info) if Self::is_interface_board(name, &info) => {
                    Some(KeiDevice::new(
                        info.product.unwrap_or_else(|| "Keithley 615 interface".to_string()),
                        port.port_name,
                        info.serial_number,
                    ))
                }
                _ => None,
            })
            .collect();

        Ok(devices)
    }

    fn get_device_port(name: Option<&str>) -> Result<String, KeiConnectorError> {
        log::debug!("Searching for interface board {:?}", name);

        Self::get_available_devices(name)?
            .into_iter()
            .next()
            .map(|device| device.port)
            .ok_or_else(|| KeiConnectorError::DeviceNotFound {
                name: name.unwrap_or("(any)").to_string(),
            })
    }

    /// Open the first board found, retrying when its shell does not answer.
    fn get_working_serial(name: Option<&str>) -> Result<KeiTerminal, KeiConnectorError> {
        for attempt in 1..=Self::CONNECT_ATTEMPTS {
            let port_candidate = Self::get_device_port(name)?;
            let mut terminal = KeiTerminal::new(&port_candidate)?;

            match terminal.initialize() {
                Ok(()) => return Ok(terminal),
                Err(KeiTerminalError::Timeout { .. }) => {
                    log::debug!("Timeout during initialization (attempt {}), retrying", attempt);
                    thread::sleep(Duration::from_secs(2));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(KeiConnectorError::NoResponse {
            attempts: Self::CONNECT_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(vid: u16, pid: u16, product: Option<&str>) -> UsbPortInfo {
        UsbPortInfo {
            vid,
            pid,
            serial_number: None,
            manufacturer: None,
            product: product.map(str::to_string),
        }
    }

    #[test]
    fn test_board_matching() {
        assert!(KeiConnector::is_interface_board(None, &usb(0x2fe3, 0x0100, None)));
        assert!(!KeiConnector::is_interface_board(None, &usb(0x0403, 0x6001, None)));

        let named = usb(0x2fe3, 0x0001, Some("KEI615"));
        assert!(KeiConnector::is_interface_board(Some("KEI615"), &named));
        assert!(!KeiConnector::is_interface_board(Some("Other"), &named));
    }

    #[test]
    fn test_get_available_devices() {
        // Depends on what is plugged in; only check the shape of what we find
        match KeiConnector::get_available_devices(None) {
            Ok(devices) => {
                for device in devices {
                    assert!(!device.name.is_empty());
                    assert!(!device.port.is_empty());
                }
            }
            Err(KeiConnectorError::SerialPort(_)) => {
                // Expected where port enumeration is unavailable
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }
}
