//! Transport
//!
//! Endpoint validation and the byte stream underneath a connection.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{RedwireError, Result};

/// Default server port
pub const DEFAULT_PORT: u16 = 6379;

/// Port value that selects a Unix socket path instead of a TCP host
pub const UNIX_SOCKET_PORT: i64 = -1;

/// Where a connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host (name or address) and port
    Tcp { host: String, port: u16 },

    /// Unix domain socket path
    Unix(PathBuf),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    /// TCP endpoint
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix socket endpoint
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Endpoint::Unix(path.into())
    }

    /// Validate a loosely typed host/port pair, as read from a command line
    /// or a config file.
    ///
    /// A port of `-1` treats `host` as a Unix socket path. Anything that is
    /// not a usable host string or a port in `1..=65535` is a type mismatch.
    pub fn from_parts(host: &str, port: i64) -> Result<Self> {
        if host.is_empty() || host.contains('\0') {
            return Err(RedwireError::TypeMismatch(format!(
                "host must be a non-empty string without NUL bytes, got {:?}",
                host
            )));
        }

        if port == UNIX_SOCKET_PORT {
            return Ok(Endpoint::unix(host));
        }

        if host.chars().any(char::is_whitespace) {
            return Err(RedwireError::TypeMismatch(format!(
                "host must not contain whitespace, got {:?}",
                host
            )));
        }

        match u16::try_from(port) {
            Ok(port) if port > 0 => Ok(Endpoint::tcp(host, port)),
            _ => Err(RedwireError::TypeMismatch(format!(
                "port must be an integer in 1..=65535 (or -1 for a unix socket), got {}",
                port
            ))),
        }
    }

    /// Parse `host:port`, `host` (default port), `unix:<path>` or an
    /// absolute socket path.
    pub fn parse(addr: &str) -> Result<Self> {
        if let Some(path) = addr.strip_prefix("unix:") {
            return Self::from_parts(path, UNIX_SOCKET_PORT);
        }
        if addr.starts_with('/') {
            return Self::from_parts(addr, UNIX_SOCKET_PORT);
        }

        match addr.rsplit_once(':') {
            // Bracketed IPv6 literal, e.g. [::1]:6379
            Some((host, port)) if !host.contains(':') || host.starts_with('[') => {
                let port: i64 = port.parse().map_err(|_| {
                    RedwireError::TypeMismatch(format!("port must be an integer, got {:?}", port))
                })?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                Self::from_parts(host, port)
            }
            _ => Self::from_parts(addr, DEFAULT_PORT as i64),
        }
    }

    /// Open a blocking transport to this endpoint
    pub fn connect(&self, config: &Config) -> Result<Transport> {
        match self {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                // Disable Nagle's algorithm for low latency
                stream.set_nodelay(config.nodelay)?;
                Ok(Transport::Tcp(stream))
            }
            Endpoint::Unix(path) => Ok(Transport::Unix(UnixStream::connect(path)?)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A connected byte stream
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Transport {
    /// Switch between blocking and non-blocking I/O
    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.set_nonblocking(nonblocking),
            Transport::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }

    /// Close both directions
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.shutdown(Shutdown::Both),
            Transport::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }

    /// Peer description for logging
    pub fn peer_description(&self) -> String {
        match self {
            Transport::Tcp(s) => s
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            Transport::Unix(s) => s
                .peer_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| format!("unix:{}", p.display())))
                .unwrap_or_else(|| "unix:<unnamed>".to_string()),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            Transport::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            Transport::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            Transport::Unix(s) => s.flush(),
        }
    }
}

impl AsRawFd for Transport {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Transport::Tcp(s) => s.as_raw_fd(),
            Transport::Unix(s) => s.as_raw_fd(),
        }
    }
}

impl From<TcpStream> for Transport {
    fn from(stream: TcpStream) -> Self {
        Transport::Tcp(stream)
    }
}

impl From<UnixStream> for Transport {
    fn from(stream: UnixStream) -> Self {
        Transport::Unix(stream)
    }
}
