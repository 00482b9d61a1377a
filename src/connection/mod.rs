//! Connection lifecycle.
//!
//! [`ConnectionController`] is the sans-io state machine that drives one
//! connection:
//!
//! 1. **Connecting** - transport connect in flight
//! 2. **HandshakeSent** - upgrade request written
//! 3. **Open** - frames flow both ways
//! 4. **Closing** - Close frame sent or received
//! 5. **Closed** - terminal
//!
//! ## Example
//!
//! ```rust
//! use wsclient::{Config, ConnectionController, ConnectionOptions, ConnectionState};
//!
//! let mut controller =
//!     ConnectionController::new(ConnectionOptions::new("example.com", 80), Config::default());
//! controller.on_connect();
//! assert_eq!(controller.state(), ConnectionState::HandshakeSent);
//!
//! let request = controller.poll_transmit().unwrap();
//! assert!(request.starts_with(b"GET / HTTP/1.1\r\n"));
//! ```

mod controller;
mod fragmenter;
mod role;
mod state;

pub use controller::ConnectionController;
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::ConnectionState;
