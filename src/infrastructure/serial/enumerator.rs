use crate::core::transport::{PortDetail, PortEnumerator};
use crate::domain::error::SerialMonResult;
use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

/// Lists the serial ports known to the operating system
#[derive(Debug, Default, Clone)]
pub struct SystemPortEnumerator;

impl SystemPortEnumerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PortEnumerator for SystemPortEnumerator {
    async fn list(&self) -> SerialMonResult<Vec<PortDetail>> {
        let ports = serialport::available_ports()?;
        debug!("Found {} serial ports", ports.len());
        Ok(ports.into_iter().map(port_detail).collect())
    }
}

fn port_detail(info: SerialPortInfo) -> PortDetail {
    match info.port_type {
        SerialPortType::UsbPort(usb) => PortDetail {
            path: info.port_name,
            manufacturer: usb.manufacturer,
            vendor_id: Some(format!("{:04x}", usb.vid)),
            product_id: Some(format!("{:04x}", usb.pid)),
        },
        _ => PortDetail {
            path: info.port_name,
            manufacturer: None,
            vendor_id: None,
            product_id: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_usb_port_detail() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyACM0".to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2341,
                pid: 0x43,
                serial_number: None,
                manufacturer: Some("Arduino (www.arduino.cc)".to_string()),
                product: None,
            }),
        };

        let detail = port_detail(info);
        assert_eq!(detail.path, "/dev/ttyACM0");
        assert_eq!(detail.vendor_id.as_deref(), Some("2341"));
        assert_eq!(detail.product_id.as_deref(), Some("0043"));
        assert_eq!(detail.manufacturer.as_deref(), Some("Arduino (www.arduino.cc)"));
    }

    #[test]
    fn test_non_usb_port_detail() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        };

        let detail = port_detail(info);
        assert_eq!(detail.path, "/dev/ttyS0");
        assert!(detail.vendor_id.is_none());
    }
}
