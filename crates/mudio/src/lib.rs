//! `mudio`: line framing for telnet-style clients.
//!
//! - `telnet`: strips IAC command/negotiation sequences and refuses every option,
//! - `line`: turns the filtered byte stream into one `String` per input line.
//!
//! Nothing here knows about sessions or commands; the server feeds each line
//! into `mudcore` and writes whatever comes back.

pub mod line;
pub mod telnet;

pub use line::TelnetLineReader;
pub use telnet::IacFilter;
