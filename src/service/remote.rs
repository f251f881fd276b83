//! Remote backend
//!
//! Speaks the binary protocol to a `dakv-server`. The connection is opened
//! lazily and re-established after any failure, so a restarted server is
//! picked up without rebuilding the service.

use std::fmt;
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{DaError, Result, StorageError};
use crate::protocol::{read_response, write_command, Command, Response, MAX_PAYLOAD_SIZE};

use super::{ServiceResult, StorageService};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn open(addr: &str, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for socket_addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&socket_addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    let read_stream = stream.try_clone()?;
                    return Ok(Self {
                        reader: BufReader::new(read_stream),
                        writer: BufWriter::new(stream),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => DaError::Io(e),
            None => DaError::Network(format!("{} resolved to no addresses", addr)),
        })
    }

    fn round_trip(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }
}

/// Storage service backed by a remote `dakv-server`
pub struct RemoteStorageService {
    addr: String,
    timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl RemoteStorageService {
    /// Default connect/read/write timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a client for `addr`; no connection is made until first use
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: Mutex::new(None),
        }
    }

    /// Round-trip a PING
    pub fn ping(&self) -> ServiceResult<()> {
        self.call(Command::Ping).map(|_| ())
    }

    /// Identity of the backend the server exposes
    pub fn remote_identity(&self) -> ServiceResult<String> {
        let payload = self.call(Command::Identity)?.unwrap_or_default();
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn call(&self, command: Command) -> ServiceResult<Option<Vec<u8>>> {
        self.request(&command)?.into_result()
    }

    /// Send one command, reconnecting as needed
    ///
    /// A failure on a pooled connection is retried once on a fresh one, since
    /// the server may have dropped an idle socket. Every command is safe to
    /// repeat: writes are upserts.
    fn request(&self, command: &Command) -> ServiceResult<Response> {
        let mut slot = self.conn.lock();

        let reused = slot.is_some();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut conn = match slot.take() {
                Some(conn) => conn,
                None => Connection::open(&self.addr, self.timeout).map_err(|e| self.unavailable(e))?,
            };

            match conn.round_trip(command) {
                Ok(response) => {
                    *slot = Some(conn);
                    return Ok(response);
                }
                Err(e) => {
                    if reused && attempt == 1 {
                        tracing::debug!(addr = %self.addr, error = %e, "Retrying on fresh connection");
                        continue;
                    }
                    return Err(self.unavailable(e));
                }
            }
        }
    }

    fn unavailable(&self, e: DaError) -> StorageError {
        StorageError::BackendUnavailable(format!("{}: {}", self.addr, e))
    }
}

impl StorageService for RemoteStorageService {
    fn read(&self, key: &[u8]) -> ServiceResult<Vec<u8>> {
        let value = self.call(Command::Read { key: key.to_vec() })?;
        Ok(value.unwrap_or_default())
    }

    fn write(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> ServiceResult<()> {
        // key_len (4) + key + timeout (8) + value
        let payload_len = 12 + key.len() + value.len();
        if payload_len > MAX_PAYLOAD_SIZE as usize {
            return Err(StorageError::InvalidArgument(format!(
                "record of {} bytes exceeds the protocol limit",
                payload_len
            )));
        }

        self.call(Command::Write {
            key: key.to_vec(),
            value: value.to_vec(),
            timeout_secs,
        })?;
        Ok(())
    }

    fn sync(&self) -> ServiceResult<()> {
        self.call(Command::Sync)?;
        Ok(())
    }
}

impl fmt::Display for RemoteStorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteStorage({})", self.addr)
    }
}
