//! gattmaster protocol types
//!
//! The command table format, the operator-facing action registry and the
//! transport capability the interactive master drives.

mod hex;
mod registry;
mod table;
mod transport;

pub use hex::{HexError, decode_hex, encode_hex, render_ascii};
pub use registry::{
    AUTH_RESPONSE_PROMPT, Action, ActionSpec, DISCONNECT_PROMPT, REGISTRY, UnknownAction,
};
pub use table::{
    ActionTag, CommandTable, Compiled, Entry, LineAssembler, ParseError, ParseErrorKind,
    TableCompiler, WriteMode, compile,
};
pub use transport::{
    Notification, NotificationStream, SubscribeConfirmation, Transport, TransportError,
};

/// Normalize a peripheral id or MAC (`EC:FE:7E:12:34:56` -> `ecfe7e123456`)
pub fn normalize_peripheral_id(id: &str) -> String {
    id.trim().replace(':', "").to_lowercase()
}
