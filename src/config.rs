//! Connection options, limits and timeouts.

use std::time::Duration;

use crate::error::ProtocolError;

/// WebSocket protocol version sent in `Sec-WebSocket-Version`.
pub const PROTOCOL_VERSION: u8 = 13;

/// Where to connect and what to send in the upgrade request.
///
/// Immutable once handed to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Request target of the upgrade request.
    pub path: String,
    /// Extra request headers, sent in order after the mandatory ones.
    pub headers: Vec<(String, String)>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 80,
            path: "/".to_string(),
            headers: Vec::new(),
        }
    }
}

impl ConnectionOptions {
    /// Options for `host:port` with the default path.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the request path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Append an extra request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of the `Host` header.
    #[must_use]
    pub fn host_header(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resource limits for incoming data.
///
/// These bound memory use for hostile or broken peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload of a single frame in bytes.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum number of frames in one fragmented message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the handshake response head in bytes.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Limits suitable for small embedded systems.
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
            max_fragment_count: 16,
            max_handshake_size: 4096,
        }
    }

    /// Validate a declared frame payload length.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<(), ProtocolError> {
        if size > self.max_frame_size as u64 {
            Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate the running size of a message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_message_size {
            Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate the fragment count of a message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooManyFragments`] if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), ProtocolError> {
        if count > self.max_fragment_count {
            Err(ProtocolError::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }
}

/// Timeouts enforced by the async client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed for the transport to connect.
    ///
    /// Default: 10 seconds
    pub connect: Duration,

    /// Time allowed between sending the upgrade request and a complete response.
    ///
    /// Default: 30 seconds
    pub handshake: Duration,

    /// Time to wait for the peer's Close after entering `Closing`
    /// before the transport is shut down.
    ///
    /// Default: 5 seconds
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(10),
            Duration::from_secs(30),
            Duration::from_secs(5),
        )
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(connect: Duration, handshake: Duration, close: Duration) -> Self {
        Self {
            connect,
            handshake,
            close,
        }
    }
}

/// WebSocket client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Timeout configuration.
    pub timeouts: Timeouts,

    /// Outgoing data messages larger than this are fragmented.
    ///
    /// Default: 16 KB
    pub fragment_size: usize,

    /// Maximum bytes requested from the transport per read.
    ///
    /// Default: 8 KB
    pub read_buffer_size: usize,

    /// Consumed prefix at which the reassembly buffer is compacted
    /// even though undecoded bytes remain.
    ///
    /// Default: 8 KB
    pub compact_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            fragment_size: 16 * 1024,
            read_buffer_size: 8192,
            compact_threshold: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the compaction threshold of the reassembly buffer.
    #[must_use]
    pub const fn with_compact_threshold(mut self, size: usize) -> Self {
        self.compact_threshold = size;
        self
    }
}
