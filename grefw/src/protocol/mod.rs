//! Scanner wire protocol.
//!
//! - [`frame`]: framing, checksums and handshake signals
//! - [`command`]: outbound requests
//! - [`response`]: response records and their decoder
//! - [`parser`]: the receive automaton
//! - [`trace`]: hex/ASCII traffic dump

pub mod command;
pub mod frame;
pub mod parser;
pub mod response;
pub mod trace;

pub use command::{Command, CommandType};
pub use frame::{Signal, control};
pub use parser::{LogObserver, ParseState, Parser, ProtocolEvent, ProtocolObserver};
pub use response::{LcdRecord, Response, StatusRecord, VersionRecord};
