use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use crate::drivers::error::GloveError;
use crate::drivers::source::{Notification, NotificationSource};
/// Newline-delimited glove link over a serial port (Bluetooth SPP or USB bridge).
pub struct SerialSource {
    port_name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    timeout: Duration,
    pending: Vec<u8>,
}
impl SerialSource {
    /// Find the glove among the available ports and open it.
    ///
    /// An explicit `port` wins; otherwise the first port whose name or USB product
    /// string contains `device_name` (case-insensitive) is used.
    pub fn discover(
        device_name: &str,
        port: Option<&str>,
        baud_rate: u32,
    ) -> Result<Self, GloveError> {
        let ports = serialport::available_ports()?;
        log::debug!("Scanning {} serial ports for {device_name:?}", ports.len());
        let info = ports
            .into_iter()
            .find(|info| match port {
                Some(name) => info.port_name == name,
                None => port_matches(info, device_name),
            })
            .ok_or_else(|| {
                GloveError::SourceNotFound(port.unwrap_or(device_name).to_owned())
            })?;
        log::info!("Found glove on {}; connecting", info.port_name);
        Self::open(&info.port_name, baud_rate)
    }
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, GloveError> {
        let timeout = Duration::from_millis(50);
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()?;
        Ok(Self {
            port_name: port_name.to_owned(),
            reader: BufReader::new(port),
            timeout,
            pending: Vec::new(),
        })
    }
}
fn take_line(pending: &mut Vec<u8>) -> Vec<u8> {
    let mut line = std::mem::take(pending);
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    line
}
/// Pull at most one newline-terminated line out of `reader`.
///
/// Bytes read before a timeout stay in `pending` for the next call. At end of
/// stream an unterminated final line is still delivered before `Closed`.
fn next_line<R: BufRead>(
    reader: &mut R,
    pending: &mut Vec<u8>,
    port_name: &str,
) -> Result<Notification, GloveError> {
    match reader.read_until(b'\n', pending) {
        Ok(0) if pending.is_empty() => Ok(Notification::Closed),
        Ok(n) if n == 0 || pending.last() == Some(&b'\n') => {
            let line = take_line(pending);
            if line.is_empty() {
                Ok(Notification::Idle)
            } else {
                Ok(Notification::Payload(line))
            }
        }
        Ok(_) => Ok(Notification::Idle),
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            Ok(Notification::Idle)
        }
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Notification::Idle),
        Err(e) => Err(GloveError::SourceDisconnected(format!("{port_name}: {e}"))),
    }
}
fn port_matches(info: &SerialPortInfo, device_name: &str) -> bool {
    let needle = device_name.to_lowercase();
    if info.port_name.to_lowercase().contains(&needle) {
        return true;
    }
    match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .as_deref()
            .map(|p| p.to_lowercase().contains(&needle))
            .unwrap_or(false),
        _ => false,
    }
}
impl NotificationSource for SerialSource {
    fn describe(&self) -> String {
        format!("serial port {}", self.port_name)
    }
    fn poll(&mut self, wait: Duration) -> Result<Notification, GloveError> {
        if wait != self.timeout {
            self.reader.get_mut().set_timeout(wait)?;
            self.timeout = wait;
        }
        next_line(&mut self.reader, &mut self.pending, &self.port_name)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;
    use std::collections::VecDeque;
    use std::io::{self, Read};

    /// Delivers scripted chunks; an `Err` entry simulates a read timeout.
    struct Scripted {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }
    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    fn drain_lines(chunks: Vec<io::Result<Vec<u8>>>) -> Vec<Notification> {
        let mut reader = BufReader::new(Scripted {
            chunks: chunks.into(),
        });
        let mut pending = Vec::new();
        let mut out = Vec::new();
        for _ in 0..20 {
            let n = next_line(&mut reader, &mut pending, "test").unwrap();
            let closed = n == Notification::Closed;
            out.push(n);
            if closed {
                break;
            }
        }
        out
    }

    #[test]
    fn unterminated_last_line_is_delivered_before_close() {
        let out = drain_lines(vec![Ok(b"1,2\r\n3,4".to_vec())]);
        assert_eq!(
            out,
            vec![
                Notification::Payload(b"1,2".to_vec()),
                // end of stream seen mid-line; the fragment is kept
                Notification::Idle,
                Notification::Payload(b"3,4".to_vec()),
                Notification::Closed,
            ]
        );
    }

    #[test]
    fn partial_line_survives_a_timeout() {
        let out = drain_lines(vec![
            Ok(b"10,2".to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Ok(b"0\n".to_vec()),
        ]);
        assert_eq!(
            out,
            vec![
                Notification::Idle,
                Notification::Payload(b"10,20".to_vec()),
                Notification::Closed,
            ]
        );
    }

    #[test]
    fn hard_read_error_is_a_disconnect() {
        let mut reader = BufReader::new(Scripted {
            chunks: vec![Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))].into(),
        });
        let mut pending = Vec::new();
        assert!(matches!(
            next_line(&mut reader, &mut pending, "COM3"),
            Err(GloveError::SourceDisconnected(_))
        ));
    }
    fn usb(port_name: &str, product: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: port_name.to_owned(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x10c4,
                pid: 0xea60,
                serial_number: None,
                manufacturer: None,
                product: product.map(str::to_owned),
            }),
        }
    }
    #[test]
    fn matches_by_product_string_case_insensitively() {
        let info = usb("/dev/ttyUSB0", Some("Jeppe Is 2 Cool"));
        assert!(port_matches(&info, "jeppe is 2 cool"));
        assert!(!port_matches(&info, "other glove"));
    }
    #[test]
    fn matches_by_port_name() {
        let info = SerialPortInfo {
            port_name: "/dev/rfcomm-glove".to_owned(),
            port_type: SerialPortType::BluetoothPort,
        };
        assert!(port_matches(&info, "GLOVE"));
        assert!(!port_matches(&usb("COM4", None), "glove"));
    }
}
