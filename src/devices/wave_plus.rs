use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{DeviceClient, DeviceError, Result};
use crate::acquisition::data::Snapshot;

/// Length of the Wave Plus "current values" characteristic.
const CURRENT_VALUES_LEN: usize = 20;
const SUPPORTED_SENSOR_VERSION: u8 = 1;
/// Radon averages above this are the sensor's "not yet available" marker.
const RADON_MAX_VALID: u16 = 16383;

/// Airthings Wave Plus monitors reached through a BLE-to-TCP gateway.
pub struct WavePlusGateway {
    address: String,
    port: u16,
    timeout: Duration,
}

/// One gateway session bound to a single device serial.
pub struct WavePlusLink {
    serial: u64,
    connection: Option<Connection>,
}

struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl WavePlusGateway {
    pub fn new(address: &str, port: u16, timeout: Duration) -> Self {
        info!("Initializing Wave Plus gateway at {}:{}", address, port);
        WavePlusGateway {
            address: address.to_string(),
            port,
            timeout,
        }
    }

    fn open_stream(&self) -> Result<TcpStream> {
        let target = format!("{}:{}", self.address, self.port);
        let socket_addr = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| DeviceError::Parse(format!("No address resolved for {}", target)))?;

        let stream = TcpStream::connect_timeout(&socket_addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

impl WavePlusLink {
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        if let Some(connection) = &mut self.connection {
            debug!("Sending command to gateway for {}: {}", self.serial, command);
            connection.stream.write_all(format!("{}\n", command).as_bytes())?;
            connection.stream.flush()?;
            Ok(())
        } else {
            error!("Attempted to send command but Wave Plus {} is not connected", self.serial);
            Err(DeviceError::NotConnected)
        }
    }

    fn read_response(&mut self) -> Result<String> {
        let Some(connection) = &mut self.connection else {
            error!("Attempted to read but Wave Plus {} is not connected", self.serial);
            return Err(DeviceError::NotConnected);
        };

        let mut response = String::new();
        let n = connection.reader.read_line(&mut response)?;
        if n == 0 {
            error!("Gateway closed the connection for device {}", self.serial);
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "Connection closed by remote",
            )));
        }
        let trimmed = response.trim().to_string();
        debug!("Received response from gateway for {}: {}", self.serial, trimmed);
        Ok(trimmed)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.send_command(command)?;
        self.read_response()
    }
}

impl DeviceClient for WavePlusGateway {
    type Handle = WavePlusLink;

    fn open(&mut self, serial: u64) -> WavePlusLink {
        WavePlusLink {
            serial,
            connection: None,
        }
    }

    fn connect(&mut self, link: &mut WavePlusLink) -> Result<()> {
        let serial = link.serial;
        info!(
            "Attempting to connect to Wave Plus {} via {}:{}",
            serial, self.address, self.port
        );
        let stream = self.open_stream()?;
        let reader = BufReader::new(stream.try_clone()?);
        link.connection = Some(Connection { stream, reader });

        // The session stays on the link even when refused so that
        // disconnect can tear down a half-open handshake.
        let reply = link.query(&format!("CONNECT {}", serial))?;
        if reply != "OK" {
            return Err(DeviceError::Refused { serial, reply });
        }
        info!("Wave Plus {} connected", serial);
        Ok(())
    }

    fn read(&mut self, link: &mut WavePlusLink) -> Result<Snapshot> {
        let reply = link.query("READ?")?;
        if reply.is_empty() || reply.eq_ignore_ascii_case("NONE") {
            debug!("Wave Plus {} has no current values yet", link.serial);
            return Ok(Snapshot::new());
        }
        let raw = parse_hex(&reply)?;
        decode_current_values(&raw)
    }

    fn disconnect(&mut self, mut link: WavePlusLink) -> Result<()> {
        if !link.is_connected() {
            debug!("Wave Plus {} never reached the gateway, nothing to release", link.serial);
            return Ok(());
        }
        let sent = link.send_command("DISCONNECT");
        let closed = match link.connection.take() {
            Some(connection) => connection.stream.shutdown(Shutdown::Both),
            None => Ok(()),
        };
        sent?;
        closed?;
        debug!("Wave Plus {} disconnected", link.serial);
        Ok(())
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return Err(DeviceError::Parse(format!("Malformed hex payload: {}", text)));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|e| DeviceError::Parse(format!("Malformed hex payload: {}", e)))
        })
        .collect()
}

/// Decode the little-endian `BBBBHHHHHHHH` current-values record.
pub fn decode_current_values(raw: &[u8]) -> Result<Snapshot> {
    if raw.len() != CURRENT_VALUES_LEN {
        return Err(DeviceError::Parse(format!(
            "Expected {} bytes of current values, got {}",
            CURRENT_VALUES_LEN,
            raw.len()
        )));
    }
    if raw[0] != SUPPORTED_SENSOR_VERSION {
        return Err(DeviceError::UnsupportedVersion(raw[0]));
    }

    let word = |index: usize| {
        let at = 4 + index * 2;
        u16::from_le_bytes([raw[at], raw[at + 1]])
    };
    let radon = |value: u16| (value <= RADON_MAX_VALID).then_some(f64::from(value));

    let mut snapshot = Snapshot::new();
    snapshot.insert("humidity", Some(f64::from(raw[1]) / 2.0));
    snapshot.insert("radon_short_term_avg", radon(word(0)));
    snapshot.insert("radon_long_term_avg", radon(word(1)));
    snapshot.insert("temperature", Some(f64::from(word(2)) / 100.0));
    snapshot.insert("pressure", Some(f64::from(word(3)) / 50.0));
    snapshot.insert("co2", Some(f64::from(word(4))));
    snapshot.insert("voc", Some(f64::from(word(5))));
    Ok(snapshot)
}
