//! Mclennan intelligent-stepper command encoding and reply decoding.
//!
//! Protocol Overview:
//! - Format: ASCII command/response over RS-232
//! - Commands: `{Axis}{Mnemonic}{Value}` terminated by CR
//! - Example: "2sa500\r" (axis 2, set acceleration, 500 steps/s²)
//! - Replies: the device echoes the command, then CR, then a
//!   `{axis}:{value}` payload, terminated by CRLF
//! - Example: "3oa\r03:-120\r\n" (axis 3 encoder position, -120 steps)
//!
//! Decoding is deliberately tolerant: a reply is only trusted if a
//! `digits:signed-digits-or-empty` payload can be found after the echoed
//! command; anything else yields "no decode" rather than an error, so one
//! garbled exchange never corrupts axis state.

use std::sync::OnceLock;

use regex_lite::Regex;

/// Datum-mode bitmask written by the `dm` command before a datum search.
///
/// Eight digits, one per controller mode bit. Site configuration for the
/// detector table; the value here matches the deployed controller setup.
pub const DATUM_MODE_MASK: &str = "00100000";

/// One outbound request to the motion controller.
///
/// Transient: a command exists only for the duration of one send/receive
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `sa` — acceleration ramp in steps/s².
    SetAcceleration(u32),
    /// `sd` — deceleration ramp in steps/s².
    SetDeceleration(u32),
    /// `sv` — slew velocity in steps/s.
    SetVelocity(u32),
    /// `sc` — creep velocity for the final datum approach.
    SetCreep(u32),
    /// `dm` — datum mode, always written with [`DATUM_MODE_MASK`].
    SetDatumMode,
    /// `hd` — drive to the datum reference position.
    HomeToDatum,
    /// `co` — query the current operation.
    CurrentOperation,
    /// `oa` — query the encoder position.
    QueryPosition,
    /// Operator-entered raw string, sent as-is (plus terminator).
    Raw(String),
}

impl Command {
    /// Render this command into its wire form: `<axis><mnemonic><args>\r`
    /// for structured commands, or the raw string plus `\r` for manual
    /// entry. An empty raw command still gets terminator-framed.
    pub fn encode(&self, axis: u8) -> String {
        match self {
            Command::SetAcceleration(v) => format!("{axis}sa{v}\r"),
            Command::SetDeceleration(v) => format!("{axis}sd{v}\r"),
            Command::SetVelocity(v) => format!("{axis}sv{v}\r"),
            Command::SetCreep(v) => format!("{axis}sc{v}\r"),
            Command::SetDatumMode => format!("{axis}dm{DATUM_MODE_MASK}\r"),
            Command::HomeToDatum => format!("{axis}hd\r"),
            Command::CurrentOperation => format!("{axis}co\r"),
            Command::QueryPosition => format!("{axis}oa\r"),
            Command::Raw(s) => format!("{s}\r"),
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Command::SetAcceleration(_) => "sa",
            Command::SetDeceleration(_) => "sd",
            Command::SetVelocity(_) => "sv",
            Command::SetCreep(_) => "sc",
            Command::SetDatumMode => "dm",
            Command::HomeToDatum => "hd",
            Command::CurrentOperation => "co",
            Command::QueryPosition => "oa",
            Command::Raw(_) => "raw",
        }
    }
}

/// Result of decoding one line of device output. Transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Axis identifier echoed in the payload, if it parsed as a digit.
    pub axis: Option<u8>,
    /// The colon-delimited payload text (e.g. "03:-120").
    pub payload: String,
    /// Signed encoder position, if the payload carried one.
    pub position: Option<i64>,
}

// Payload shape: digits, colon, optionally-signed digits or nothing.
// Anchored at the end so leading garbage and the echoed command are
// skipped over.
#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
fn payload_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+):(-?\d*)\s*$").unwrap())
}

/// Decode one raw reply line into a [`ParsedResponse`].
///
/// The device echoes the command framed between carriage returns before the
/// real payload, so only the text after the last embedded CR is considered.
/// Returns `None` when no `digits:value` payload is present — callers must
/// treat that as "no update this cycle", distinct from a transport failure.
pub fn decode_line(line: &str) -> Option<ParsedResponse> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let tail = trimmed.rsplit('\r').next().unwrap_or(trimmed);

    let captures = payload_pattern().captures(tail)?;
    let payload = captures.get(0).map(|m| m.as_str().trim().to_string())?;
    let axis = captures.get(1).and_then(|m| m.as_str().parse::<u8>().ok());
    let position = captures
        .get(2)
        .filter(|m| !m.as_str().is_empty())
        .and_then(|m| m.as_str().parse::<i64>().ok());

    Some(ParsedResponse {
        axis,
        payload,
        position,
    })
}
