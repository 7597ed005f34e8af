//! Serial port transport backed by tokio-serial.

use async_trait::async_trait;
use std::io;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use super::{CandidateAddress, PortLister, Transport};
use crate::error::Result;

/// Opens serial ports at a fixed baud rate, 8N1, no flow control.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    baud_rate: u32,
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(115_200)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    type Connection = SerialStream;

    async fn open(&self, address: &CandidateAddress) -> io::Result<SerialStream> {
        let stream = tokio_serial::new(address.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        Ok(stream)
    }
}

/// The operating system's own serial port listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePortLister;

impl PortLister for NativePortLister {
    fn list_ports(&self) -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}
