//! Async client over a tokio byte stream.
//!
//! [`WebSocketClient`] owns the transport and a [`ConnectionController`], and
//! turns reads, writes and deadlines into controller callbacks. Everything
//! runs on the caller's task.
//!
//! ```rust,no_run
//! use wsclient::{CloseCode, Config, ConnectionOptions, Event, WebSocketClient};
//!
//! # async fn run() -> wsclient::Result<()> {
//! let options = ConnectionOptions::new("echo.example.com", 80).with_path("/ws");
//! let mut client = WebSocketClient::connect(options, Config::default()).await?;
//!
//! while let Some(event) = client.next_event().await {
//!     match event {
//!         Event::Connect => client.send_text("hello").await?,
//!         Event::Message(text) => {
//!             println!("{text}");
//!             client.close(CloseCode::Normal, "done").await?;
//!         }
//!         Event::Disconnect => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::{Config, ConnectionOptions};
use crate::connection::{ConnectionController, ConnectionState};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::message::CloseCode;

/// A client connection driven by reads from `T`.
#[derive(Debug)]
pub struct WebSocketClient<T> {
    io: T,
    controller: ConnectionController,
    read_buf: Vec<u8>,
    handshake_deadline: Instant,
    close_deadline: Option<Instant>,
    shut_down: bool,
}

impl WebSocketClient<TcpStream> {
    /// Open a TCP connection to `options.host:options.port` and start the
    /// handshake.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the connection fails or exceeds the connect timeout.
    pub async fn connect(options: ConnectionOptions, config: Config) -> Result<Self> {
        let connect = TcpStream::connect((options.host.as_str(), options.port));
        let stream = tokio::time::timeout(config.timeouts.connect, connect)
            .await
            .map_err(|_| {
                Error::Transport(format!("connect to {} timed out", options.host_header()))
            })??;
        stream.set_nodelay(true)?;

        tracing::debug!(host = %options.host, port = options.port, "transport connected");
        Ok(Self::new(stream, options, config))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketClient<T> {
    /// Wrap an already connected transport. The upgrade request is queued and
    /// written by the first call to [`next_event`](Self::next_event).
    #[must_use]
    pub fn new(io: T, options: ConnectionOptions, config: Config) -> Self {
        let read_buf = vec![0u8; config.read_buffer_size.max(1)];
        let handshake_deadline = Instant::now() + config.timeouts.handshake;

        let mut controller = ConnectionController::new(options, config);
        controller.on_connect();

        Self {
            io,
            controller,
            read_buf,
            handshake_deadline,
            close_deadline: None,
            shut_down: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    /// Wait for the next event. Returns `None` after [`Event::Disconnect`].
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            // Write failures come back as events.
            let _ = self.flush().await;

            if self.controller.wants_shutdown() && !self.shut_down {
                self.shut_down = true;
                if let Err(err) = self.io.shutdown().await {
                    tracing::debug!(error = %err, "transport shutdown failed");
                }
                self.controller.on_close();
            }

            if let Some(event) = self.controller.poll_event() {
                return Some(event);
            }
            if self.controller.state() == ConnectionState::Closed {
                return None;
            }

            self.read_chunk().await;
        }
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// Anything [`ConnectionController::send_text`] rejects, or
    /// `Error::Transport` if the write fails.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.controller.send_text(text)?;
        self.flush().await
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// Same as [`send_text`](Self::send_text).
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.controller.send_binary(data)?;
        self.flush().await
    }

    /// Send a Ping. The Pong arrives as [`Event::Pong`].
    ///
    /// # Errors
    ///
    /// Same as [`send_text`](Self::send_text); payloads over 125 bytes are refused.
    pub async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.controller.ping(payload)?;
        self.flush().await
    }

    /// Send an unsolicited Pong.
    ///
    /// # Errors
    ///
    /// Same as [`ping`](Self::ping).
    pub async fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.controller.pong(payload)?;
        self.flush().await
    }

    /// Send a Close frame. Keep calling [`next_event`](Self::next_event)
    /// until `None` to complete the closing handshake; the transport is shut
    /// down after the close timeout if the server does not answer.
    ///
    /// # Errors
    ///
    /// Anything [`ConnectionController::close`] rejects, or `Error::Transport`.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        self.controller.close(code, reason)?;
        self.close_deadline = Some(Instant::now() + self.controller.config().timeouts.close);
        self.flush().await
    }

    /// Give back the transport.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    async fn flush(&mut self) -> Result<()> {
        while let Some(bytes) = self.controller.poll_transmit() {
            if self.shut_down {
                continue;
            }
            let written = match self.io.write_all(&bytes).await {
                Ok(()) => self.io.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                let reason = err.to_string();
                self.controller.on_error(reason.clone());
                return Err(Error::Transport(reason));
            }
        }
        Ok(())
    }

    async fn read_chunk(&mut self) {
        let deadline = match self.controller.state() {
            ConnectionState::HandshakeSent => Some(self.handshake_deadline),
            ConnectionState::Closing => {
                let close_timeout = self.controller.config().timeouts.close;
                Some(
                    *self
                        .close_deadline
                        .get_or_insert_with(|| Instant::now() + close_timeout),
                )
            }
            _ => None,
        };

        let read = self.io.read(&mut self.read_buf);
        let result = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
                Ok(result) => result,
                Err(_) => {
                    self.on_deadline();
                    return;
                }
            },
            None => read.await,
        };

        match result {
            Ok(0) => self.controller.on_close(),
            Ok(n) => {
                tracing::trace!(len = n, "transport read");
                self.controller.on_data(&self.read_buf[..n]);
            }
            Err(err) => self.controller.on_error(err.to_string()),
        }
    }

    fn on_deadline(&mut self) {
        match self.controller.state() {
            ConnectionState::HandshakeSent => self.controller.on_handshake_timeout(),
            ConnectionState::Closing => self.controller.force_close(),
            _ => {}
        }
    }
}
