//! Object-dictionary command codec.
//!
//! Formats and parses the textual gateway protocol:
//!
//! ```text
//! [<bus>] <node> write 0x<index> <sub> <type> <value>
//! [<bus>] <node> read 0x<index> <sub> <type>
//! [<bus>] <node> start | preop | stop | reset node
//! ```
//!
//! Replies are `[<seq>] OK`, `[<seq>] <value>` or `[<seq>] ERROR: <code>`.
//! Index and hexadecimal values are lower-case without zero padding.

use exo_common::drive::{DataType, DriveError};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Malformed command or reply text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty line")]
    Empty,
    #[error("missing bus prefix in '{0}'")]
    MissingBus(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unknown datatype '{0}'")]
    UnknownType(String),
    #[error("unknown verb '{0}'")]
    UnknownVerb(String),
    #[error("missing field '{field}' in '{line}'")]
    MissingField { field: &'static str, line: String },
}

impl From<CodecError> for DriveError {
    fn from(e: CodecError) -> Self {
        DriveError::MalformedReply(e.to_string())
    }
}

// ─── Values ─────────────────────────────────────────────────────────

/// Value field of a write command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoValue {
    /// Rendered as `0x<lower-hex>`.
    Hex(u32),
    /// Rendered in decimal.
    Dec(i64),
}

impl SdoValue {
    /// Numeric value, reinterpreted for `data_type`.
    pub fn as_i64(self, data_type: DataType) -> i64 {
        match self {
            Self::Hex(v) => data_type.normalize(v as i64),
            Self::Dec(v) => data_type.normalize(v),
        }
    }
}

impl fmt::Display for SdoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex(v) => write!(f, "0x{v:x}"),
            Self::Dec(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for SdoValue {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
                .map(Self::Hex)
                .map_err(|_| CodecError::InvalidNumber(s.to_string()))
        } else {
            s.parse::<i64>()
                .map(Self::Dec)
                .map_err(|_| CodecError::InvalidNumber(s.to_string()))
        }
    }
}

// ─── Commands ───────────────────────────────────────────────────────

/// Network management commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtCommand {
    Start,
    PreOperational,
    Stop,
    ResetNode,
}

impl NmtCommand {
    const fn token(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::PreOperational => "preop",
            Self::Stop => "stop",
            Self::ResetNode => "reset node",
        }
    }
}

/// Body of one gateway command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Write {
        address: u16,
        subindex: u8,
        data_type: DataType,
        value: SdoValue,
    },
    Read {
        address: u16,
        subindex: u8,
        data_type: DataType,
    },
    Nmt(NmtCommand),
}

/// A command addressed to one node on one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub bus: u8,
    pub node_id: u8,
    pub command: Command,
}

impl Request {
    /// Control-word value if this request writes `control_word_address`.
    pub fn control_word(&self, control_word_address: u16) -> Option<u16> {
        match self.command {
            Command::Write {
                address, value, ..
            } if address == control_word_address => Some(value.as_i64(DataType::U16) as u16),
            _ => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ", self.bus, self.node_id)?;
        match self.command {
            Command::Write {
                address,
                subindex,
                data_type,
                value,
            } => write!(f, "write 0x{address:x} {subindex} {data_type} {value}"),
            Command::Read {
                address,
                subindex,
                data_type,
            } => write!(f, "read 0x{address:x} {subindex} {data_type}"),
            Command::Nmt(nmt) => f.write_str(nmt.token()),
        }
    }
}

impl FromStr for Request {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let bus_token = tokens.next().ok_or(CodecError::Empty)?;
        let bus = bus_token
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .ok_or_else(|| CodecError::MissingBus(line.to_string()))
            .and_then(|t| parse_int::<u8>(t))?;
        let node_id = parse_int::<u8>(field(&mut tokens, "node", line)?)?;

        let command = match field(&mut tokens, "verb", line)? {
            verb @ ("write" | "read") => {
                let address = parse_address(field(&mut tokens, "index", line)?)?;
                let subindex = parse_int::<u8>(field(&mut tokens, "subindex", line)?)?;
                let type_token = field(&mut tokens, "type", line)?;
                let data_type = DataType::from_token(type_token)
                    .ok_or_else(|| CodecError::UnknownType(type_token.to_string()))?;
                if verb == "write" {
                    let value = field(&mut tokens, "value", line)?.parse()?;
                    Command::Write {
                        address,
                        subindex,
                        data_type,
                        value,
                    }
                } else {
                    Command::Read {
                        address,
                        subindex,
                        data_type,
                    }
                }
            }
            "start" => Command::Nmt(NmtCommand::Start),
            "preop" => Command::Nmt(NmtCommand::PreOperational),
            "stop" => Command::Nmt(NmtCommand::Stop),
            "reset" => match tokens.next() {
                Some("node") => Command::Nmt(NmtCommand::ResetNode),
                other => return Err(CodecError::UnknownVerb(format!("reset {}", other.unwrap_or("")))),
            },
            other => return Err(CodecError::UnknownVerb(other.to_string())),
        };

        Ok(Self {
            bus,
            node_id,
            command,
        })
    }
}

fn field<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
    line: &str,
) -> Result<&'a str, CodecError> {
    tokens.next().ok_or_else(|| CodecError::MissingField {
        field: name,
        line: line.to_string(),
    })
}

fn parse_int<T: FromStr>(token: &str) -> Result<T, CodecError> {
    token
        .parse()
        .map_err(|_| CodecError::InvalidNumber(token.to_string()))
}

fn parse_address(token: &str) -> Result<u16, CodecError> {
    token
        .strip_prefix("0x")
        .and_then(|hex| u16::from_str_radix(hex, 16).ok())
        .ok_or_else(|| CodecError::InvalidNumber(token.to_string()))
}

// ─── Codec ──────────────────────────────────────────────────────────

/// Stateless builder of command strings for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectDictionaryCodec {
    bus: u8,
    node_id: u8,
}

impl ObjectDictionaryCodec {
    pub const fn new(bus: u8, node_id: u8) -> Self {
        Self { bus, node_id }
    }

    pub const fn node_id(&self) -> u8 {
        self.node_id
    }

    pub const fn write_request(
        &self,
        address: u16,
        subindex: u8,
        data_type: DataType,
        value: SdoValue,
    ) -> Request {
        Request {
            bus: self.bus,
            node_id: self.node_id,
            command: Command::Write {
                address,
                subindex,
                data_type,
                value,
            },
        }
    }

    pub const fn read_request(&self, address: u16, subindex: u8, data_type: DataType) -> Request {
        Request {
            bus: self.bus,
            node_id: self.node_id,
            command: Command::Read {
                address,
                subindex,
                data_type,
            },
        }
    }

    pub const fn nmt_request(&self, nmt: NmtCommand) -> Request {
        Request {
            bus: self.bus,
            node_id: self.node_id,
            command: Command::Nmt(nmt),
        }
    }

    /// `[<bus>] <node> write 0x<index> <sub> <type> <value>`
    pub fn write(&self, address: u16, subindex: u8, data_type: DataType, value: SdoValue) -> String {
        self.write_request(address, subindex, data_type, value)
            .to_string()
    }

    /// `[<bus>] <node> read 0x<index> <sub> <type>`
    pub fn read(&self, address: u16, subindex: u8, data_type: DataType) -> String {
        self.read_request(address, subindex, data_type).to_string()
    }
}

// ─── Replies ────────────────────────────────────────────────────────

/// Parsed gateway reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Value(i64),
    /// Abort code; the transport rejected the command.
    Error(u32),
}

impl FromStr for Reply {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let body = match line.strip_prefix('[') {
            Some(rest) => rest
                .split_once(']')
                .map(|(_, body)| body.trim())
                .ok_or_else(|| CodecError::MissingBus(line.to_string()))?,
            None => line,
        };
        if body.is_empty() {
            return Err(CodecError::Empty);
        }
        if body.eq_ignore_ascii_case("ok") {
            return Ok(Self::Ok);
        }
        if let Some(code) = body.strip_prefix("ERROR:") {
            let code = code.trim();
            let parsed = match code.parse::<SdoValue>()? {
                SdoValue::Hex(v) => v,
                SdoValue::Dec(v) => v as u32,
            };
            return Ok(Self::Error(parsed));
        }
        match body.parse::<SdoValue>()? {
            SdoValue::Hex(v) => Ok(Self::Value(v as i64)),
            SdoValue::Dec(v) => Ok(Self::Value(v)),
        }
    }
}
