//! Telnet IAC filtering.
//!
//! Line-mode clients (telnet, MUD clients) sprinkle the stream with IAC
//! sequences. We never negotiate anything:
//! - `IAC DO <opt>`   => `IAC WONT <opt>`
//! - `IAC WILL <opt>` => `IAC DONT <opt>`
//! - `IAC SB ... IAC SE` is dropped entirely,
//! - `IAC IAC` is a literal 0xff data byte.

use bytes::{BufMut, BytesMut};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Data,
    Iac,
    /// Saw `IAC <verb>`; the next byte is the option.
    Option(u8),
    Sub,
    SubIac,
}

/// Incremental IAC filter. Sequences may be split across reads.
#[derive(Debug, Default)]
pub struct IacFilter {
    state: State,
}

impl IacFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk from the peer.
    ///
    /// Plain data bytes are appended to `data`; refusals for option
    /// negotiation are appended to `replies` and should be written back.
    pub fn feed(&mut self, chunk: &[u8], data: &mut BytesMut, replies: &mut BytesMut) {
        for &b in chunk {
            self.state = match (self.state, b) {
                (State::Data, IAC) => State::Iac,
                (State::Data, _) => {
                    data.put_u8(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    data.put_u8(IAC);
                    State::Data
                }
                (State::Iac, DO | DONT | WILL | WONT) => State::Option(b),
                (State::Iac, SB) => State::Sub,
                // NOP, GA, AYT and friends carry no payload.
                (State::Iac, _) => State::Data,
                (State::Option(verb), opt) => {
                    match verb {
                        DO => replies.put_slice(&[IAC, WONT, opt]),
                        WILL => replies.put_slice(&[IAC, DONT, opt]),
                        _ => {}
                    }
                    State::Data
                }
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }
    }

    #[cfg(test)]
    fn is_mid_sequence(&self) -> bool {
        self.state != State::Data
    }
}
