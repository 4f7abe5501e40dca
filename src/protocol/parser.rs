// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Line framing and request parsing for the host link.
//!
//! Bytes are fed one at a time. A line ends at `\r` or `\n`; `\r\n` and blank lines produce
//! nothing. Verbs are case-insensitive and come in a short and a long form; the short `P`/`p`
//! pair is told apart by its argument count:
//!
//! | Request                                   | Message       |
//! | ----------------------------------------- | ------------- |
//! | `P az el`, `set_pos az el`, `\set_pos ..` | `SetPosition` |
//! | `p`, `get_pos`, `\get_pos`                | `GetPosition` |
//! | `S`, `stop`, `\stop`                      | `Stop`        |
//! | `R [n]`, `reset [n]`, `\reset [n]`        | `Reset`       |
//! | `_`, `get_info`, `\get_info`              | `GetInfo`     |
//!
//! A line longer than [`MAX_LINE_LEN`] is reported as malformed as soon as it overflows, and the
//! rest of it is dropped up to the next terminator, or until the link goes quiet for the line
//! timeout.

use core::str::FromStr;

use crate::config::MAX_LINE_LEN;
use crate::protocol::messages::{Line, ProtocolMessage};
use crate::time::elapsed;

/// Most arguments any request takes.
const MAX_ARGS: usize = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    AwaitingLine,
    Accumulating { last_byte_us: u32 },
    /// Dropping the tail of an overlong line.
    Discarding { last_byte_us: u32 },
}

/// Host-link line engine. Owns only the line buffer.
pub struct ProtocolEngine {
    state: State,
    line: Line,
    line_timeout_us: u32,
}

impl ProtocolEngine {
    /// A partial line that receives nothing for `line_timeout_us` is dropped by [`poll_timeout`].
    ///
    /// [`poll_timeout`]: ProtocolEngine::poll_timeout
    pub fn new(line_timeout_us: u32) -> Self {
        Self {
            state: State::AwaitingLine,
            line: Line::new(),
            line_timeout_us,
        }
    }

    /// Process one received byte. Returns a message when a line completes or overflows.
    pub fn push(&mut self, byte: u8, now_us: u32) -> Option<ProtocolMessage> {
        let terminator = byte == b'\r' || byte == b'\n';

        match self.state {
            State::AwaitingLine => {
                if !terminator {
                    self.line.clear();
                    // Empty buffer, cannot overflow.
                    let _ = self.line.push(byte);
                    self.state = State::Accumulating {
                        last_byte_us: now_us,
                    };
                }
                None
            }
            State::Accumulating { .. } => {
                if terminator {
                    self.state = State::AwaitingLine;
                    let msg = parse_line(&self.line);
                    self.line.clear();
                    return msg;
                }
                if self.line.push(byte).is_err() {
                    warn!("host line longer than {} bytes", MAX_LINE_LEN);
                    self.state = State::Discarding {
                        last_byte_us: now_us,
                    };
                    let raw = core::mem::take(&mut self.line);
                    return Some(ProtocolMessage::Malformed { raw });
                }
                self.state = State::Accumulating {
                    last_byte_us: now_us,
                };
                None
            }
            State::Discarding { .. } => {
                self.state = if terminator {
                    State::AwaitingLine
                } else {
                    State::Discarding {
                        last_byte_us: now_us,
                    }
                };
                None
            }
        }
    }

    /// Drop a partial line whose sender has gone quiet for the line timeout.
    ///
    /// An unterminated overlong line was already reported when it overflowed, so only the
    /// framing is reset for it.
    pub fn poll_timeout(&mut self, now_us: u32) -> Option<ProtocolMessage> {
        match self.state {
            State::Accumulating { last_byte_us }
                if elapsed(now_us, last_byte_us) >= self.line_timeout_us =>
            {
                debug!("partial host line timed out");
                self.state = State::AwaitingLine;
                let raw = core::mem::take(&mut self.line);
                Some(ProtocolMessage::Malformed { raw })
            }
            State::Discarding { last_byte_us }
                if elapsed(now_us, last_byte_us) >= self.line_timeout_us =>
            {
                debug!("overlong host line never terminated");
                self.state = State::AwaitingLine;
                None
            }
            _ => None,
        }
    }

    /// True while a line is partially received.
    #[inline]
    pub fn is_receiving(&self) -> bool {
        self.state != State::AwaitingLine
    }
}

/// Parse one line (terminator excluded). Blank lines yield `None`.
pub fn parse_line(line: &[u8]) -> Option<ProtocolMessage> {
    let Ok(text) = core::str::from_utf8(line) else {
        return Some(ProtocolMessage::malformed(line));
    };

    let mut words = text.split_ascii_whitespace();
    let verb = words.next()?;

    let mut args: heapless::Vec<&str, MAX_ARGS> = heapless::Vec::new();
    for word in words {
        if args.push(word).is_err() {
            return Some(ProtocolMessage::malformed(line));
        }
    }

    let msg = match (Verb::parse(verb), args.as_slice()) {
        (Some(Verb::ShortP), [az, el]) | (Some(Verb::SetPos), [az, el]) => {
            match (parse_arg::<f32>(az), parse_arg::<f32>(el)) {
                (Some(azimuth), Some(elevation)) => {
                    Some(ProtocolMessage::SetPosition { azimuth, elevation })
                }
                _ => None,
            }
        }
        (Some(Verb::ShortP), []) | (Some(Verb::GetPos), []) => Some(ProtocolMessage::GetPosition),
        (Some(Verb::Stop), []) => Some(ProtocolMessage::Stop),
        (Some(Verb::Reset), []) => Some(ProtocolMessage::Reset),
        (Some(Verb::Reset), [kind]) => parse_arg::<u32>(kind).map(|_| ProtocolMessage::Reset),
        (Some(Verb::GetInfo), []) => Some(ProtocolMessage::GetInfo),
        _ => None,
    };

    Some(msg.unwrap_or_else(|| {
        debug!("malformed host line");
        ProtocolMessage::malformed(line)
    }))
}

fn parse_arg<T: FromStr>(word: &str) -> Option<T> {
    word.parse().ok()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Verb {
    /// `P` or `p`: set or get, decided by the argument count.
    ShortP,
    SetPos,
    GetPos,
    Stop,
    Reset,
    GetInfo,
}

impl Verb {
    fn parse(word: &str) -> Option<Verb> {
        // Long names may carry Hamlib's `\` prefix; short names never do.
        let (name, long_only) = match word.strip_prefix('\\') {
            Some(name) => (name, true),
            None => (word, false),
        };

        const LONG: [(&str, Verb); 5] = [
            ("set_pos", Verb::SetPos),
            ("get_pos", Verb::GetPos),
            ("stop", Verb::Stop),
            ("reset", Verb::Reset),
            ("get_info", Verb::GetInfo),
        ];
        if let Some((_, verb)) = LONG.iter().find(|(n, _)| name.eq_ignore_ascii_case(n)) {
            return Some(*verb);
        }
        if long_only {
            return None;
        }

        match name {
            "P" | "p" => Some(Verb::ShortP),
            "S" | "s" => Some(Verb::Stop),
            "R" | "r" => Some(Verb::Reset),
            "_" => Some(Verb::GetInfo),
            _ => None,
        }
    }
}
