//! Plain-text request/reply protocol spoken between nodes and by clients.
//!
//! ```text
//! PUT <n> <key> <vclock-token> <value...>
//! GET <n> <key>
//! ```
//!
//! `n = 0` asks the receiving node to apply or read locally only.
//!
//! A node that forwards a request to the key's owner prefixes the line with
//! `FORWARDED`. The receiver serves such a request itself and never passes
//! it on again, so a request crosses at most one extra hop.

use crate::error::{Result, RingError};
use crate::node::Node;
use crate::operations::{
    GetValueOperationOutcome, GetValueOperationRequest, PutValueOperationRequest,
};
use crate::vclock::VectorClock;

pub const NO_DATA: &str = "null";

pub const FORWARDED_MARKER: &str = "FORWARDED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCommand {
    Put {
        n: usize,
        key: String,
        vclock: VectorClock,
        value: String,
    },
    Get {
        n: usize,
        key: String,
    },
}

impl RpcCommand {
    /// Parses one request line. Nothing is applied until this succeeds.
    ///
    /// The line is taken as framed by the caller: a PUT value keeps every
    /// trailing byte, including newlines.
    pub fn parse(line: &str) -> Result<Self> {
        let (method, payload) = line
            .split_once(' ')
            .ok_or_else(|| RingError::InvalidRequest(format!("incomplete request: {}", line)))?;

        match method.to_ascii_uppercase().as_str() {
            "PUT" => {
                let mut parts = payload.splitn(4, ' ');
                let n = parse_n(parts.next())?;
                let key = parse_key(parts.next())?;
                let token = parts.next().ok_or_else(|| {
                    RingError::InvalidRequest("PUT is missing its vector clock".to_string())
                })?;
                let value = parts
                    .next()
                    .ok_or_else(|| RingError::InvalidRequest("PUT is missing its value".to_string()))?;

                Ok(Self::Put {
                    n,
                    key,
                    vclock: VectorClock::parse_token(token)?,
                    value: value.to_string(),
                })
            }
            "GET" => {
                let mut parts = payload.splitn(2, ' ');
                let n = parse_n(parts.next())?;
                let key = parse_key(parts.next())?;
                Ok(Self::Get { n, key })
            }
            other => Err(RingError::InvalidRequest(format!(
                "unknown method: {}",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Put {
                n,
                key,
                vclock,
                value,
            } => format!("PUT {} {} {} {}", n, key, vclock.to_token(), value),
            Self::Get { n, key } => format!("GET {} {}", n, key),
        }
    }
}

/// A command together with how it reached this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    pub command: RpcCommand,
    /// Sent by a ring member on behalf of a client; must not be forwarded.
    pub forwarded: bool,
}

impl RpcRequest {
    pub fn direct(command: RpcCommand) -> Self {
        Self {
            command,
            forwarded: false,
        }
    }

    pub fn forwarded(command: RpcCommand) -> Self {
        Self {
            command,
            forwarded: true,
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        match line.split_once(' ') {
            Some((marker, rest)) if marker.eq_ignore_ascii_case(FORWARDED_MARKER) => {
                Ok(Self::forwarded(RpcCommand::parse(rest)?))
            }
            _ => Ok(Self::direct(RpcCommand::parse(line)?)),
        }
    }

    pub fn encode(&self) -> String {
        if self.forwarded {
            format!("{} {}", FORWARDED_MARKER, self.command.encode())
        } else {
            self.command.encode()
        }
    }
}

fn parse_n(raw: Option<&str>) -> Result<usize> {
    let raw = raw.unwrap_or_default();
    raw.parse::<usize>()
        .map_err(|_| RingError::InvalidRequest(format!("invalid replica count: '{}'", raw)))
}

fn parse_key(raw: Option<&str>) -> Result<String> {
    let key = raw.unwrap_or_default().trim();
    validate_key(key)?;
    Ok(key.to_string())
}

/// Keys travel as a single protocol token.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(RingError::InvalidRequest("key cannot be empty".to_string()));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(RingError::InvalidRequest(format!(
            "key cannot contain whitespace: '{}'",
            key
        )));
    }
    Ok(())
}

/// Encoded answer plus the replicas that did not contribute to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply {
    pub body: String,
    pub unreachable: Vec<String>,
}

pub fn encode_outcome(outcome: &GetValueOperationOutcome) -> Result<String> {
    match outcome {
        GetValueOperationOutcome::Local(siblings) => siblings.to_json(),
        GetValueOperationOutcome::Resolved(value) => value.to_json(),
        GetValueOperationOutcome::Conflict(values) => Ok(serde_json::to_string(values)?),
        GetValueOperationOutcome::Empty => Ok(NO_DATA.to_string()),
    }
}

/// Serves one request line against `node`.
pub async fn dispatch(node: &Node, line: &str) -> Result<RpcReply> {
    let RpcRequest { command, forwarded } = RpcRequest::parse(line)?;
    match command {
        RpcCommand::Put {
            n,
            key,
            vclock,
            value,
        } => {
            let result = node
                .run_put(PutValueOperationRequest {
                    key,
                    vclock,
                    value,
                    n,
                    forwarded,
                })
                .await?;
            Ok(RpcReply {
                body: result.siblings.to_json()?,
                unreachable: result.unreachable,
            })
        }
        RpcCommand::Get { n, key } => {
            let result = node
                .run_get(GetValueOperationRequest { key, n, forwarded })
                .await?;
            Ok(RpcReply {
                body: encode_outcome(&result.outcome)?,
                unreachable: result.unreachable,
            })
        }
    }
}
