//! Line acknowledgment protocol.
//!
//! Newline-delimited text over TCP:
//!
//! ```text
//! Request:  <any text>\n
//! Response: <acknowledgment>\n
//!
//! Example:
//! Request:  hello\n
//! Response: Servidor: Mensaje recibido\n
//! ```
//!
//! Every request line gets exactly one response line, in order. There are
//! no commands and no error responses; a server-side fault is only visible
//! to the client as the connection closing.

pub mod handler;
pub mod parser;

pub use handler::{handle_connection, ConnectionSummary};
pub use parser::{encode_line, is_sentinel, strip_line_ending};

/// Log tag for lines received from a client.
pub const CLIENT_MESSAGE_TAG: &str = "[MENSAJE CLIENTE]";

/// Prefix the client prints in front of each server reply.
pub const SERVER_REPLY_TAG: &str = "[RESPUESTA SERVIDOR]";
