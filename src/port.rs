use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::cli::SerialOpts;

/// Byte pipe to the radio modem. Owned by the serial worker alone.
pub trait Link: Send {
    /// Append every byte available right now without waiting for more.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl Link for SerialLink {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let n = self.port.bytes_to_read()? as usize;
        if n == 0 {
            return Ok(0);
        }
        let start = buf.len();
        buf.resize(start + n, 0);
        self.port.read_exact(&mut buf[start..])?;
        Ok(n)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

pub fn open_port(opts: &SerialOpts) -> Result<SerialLink> {
    let builder = serialport::new(&opts.dev, opts.baud)
        .timeout(Duration::from_millis(100))
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if opts.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    let port = builder
        .open()
        .map_err(|e| anyhow::anyhow!("open {}: {}", opts.dev, e))?;
    Ok(SerialLink { port })
}
