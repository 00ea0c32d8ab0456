//! ackline: a line-oriented TCP acknowledgment service.
//!
//! The server accepts connections and answers every newline-terminated
//! line with a fixed acknowledgment line. Features:
//! - Fixed-size worker pool bounding concurrently served connections
//! - Bounded queue for connections waiting on a free worker
//! - Observable listener lifecycle
//! - Configuration via CLI arguments or TOML file
//!
//! The companion client relays console lines to the server and prints
//! each reply until a sentinel input ends the session.

pub mod client;
pub mod config;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod server;

pub use config::{ClientConfig, Config};
pub use server::{Listener, ListenerState, ServerError};
