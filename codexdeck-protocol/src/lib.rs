//! codexdeck wire protocol
//!
//! Defines the newline-delimited JSON-RPC frames exchanged with the agent
//! subprocess and the event types the orchestrator exposes to a presentation
//! layer. The wire format itself lives in [`frames`]; arbitrary JSON payloads
//! are carried as [`JsonValue`].

pub mod events;
pub mod frames;
pub mod value;

pub use events::{AppServerEvent, TerminalEvent, TerminalExitEvent, TerminalOutputEvent};
pub use frames::{IncomingFrame, CONNECTED_METHOD, PARSE_ERROR_METHOD, STDERR_METHOD};
pub use value::JsonValue;
