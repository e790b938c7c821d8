use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::{HostHandle, ObjectId, SessionId};
use crate::value::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {found} as {expected}{}", argument_suffix(.argument))]
pub struct DecodeError {
    pub expected: ValueKind,
    pub found: String,
    pub argument: Option<usize>,
}

fn argument_suffix(argument: &Option<usize>) -> String {
    argument
        .map(|index| format!(" (argument {})", index))
        .unwrap_or_default()
}

impl DecodeError {
    pub fn new(expected: ValueKind, found: impl Into<String>) -> Self {
        Self {
            expected,
            found: found.into(),
            argument: None,
        }
    }

    pub fn at_argument(mut self, index: usize) -> Self {
        self.argument = Some(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("object {object} of type {type_name} has no bound host handle")]
    Unbound { object: ObjectId, type_name: String },
    #[error("object {object} belongs to {owner}, not {session}")]
    ForeignSession {
        object: ObjectId,
        owner: SessionId,
        session: SessionId,
    },
    #[error("object {object} claiming type {type_name} was not issued by this session")]
    Counterfeit { object: ObjectId, type_name: String },
    #[error("object {object} is already bound to {existing}")]
    AlreadyBound {
        object: ObjectId,
        existing: HostHandle,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct HostError {
    pub code: String,
    pub message: String,
}

impl HostError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("HOST_ERROR", message)
    }
}

impl From<DecodeError> for HostError {
    fn from(error: DecodeError) -> Self {
        Self::new("BRIDGE_DECODE_ERROR", error.to_string())
    }
}

impl From<BridgeError> for HostError {
    fn from(error: BridgeError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotFoundKind {
    Function,
    Method,
    Property,
    ObjectType,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Property => "property",
            Self::ObjectType => "object type",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("{kind} \"{name}\" is not registered")]
    NotFound { kind: NotFoundKind, name: String },
    #[error("identity violation: {0}")]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Handler(#[from] HostError),
    #[error("invalid registration: {0}")]
    Registration(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn not_found(kind: NotFoundKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "BRIDGE_DECODE_ERROR",
            Self::NotFound { .. } => "BRIDGE_NOT_FOUND",
            Self::Identity(_) => "BRIDGE_IDENTITY_VIOLATION",
            Self::Handler(_) => "HOST_ERROR",
            Self::Registration(_) => "BRIDGE_REGISTRATION_INVALID",
            Self::Config(_) => "BRIDGE_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Parse,
    Runtime,
    Host,
    Limit,
    Decode,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{filename}:{line}: {message}")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub filename: String,
    /// 1-based; 0 when the engine reported no position.
    pub line: usize,
    pub column: Option<usize>,
    pub code: Option<String>,
}

impl ErrorReport {
    pub fn new(kind: ErrorKind, message: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            filename: filename.into(),
            line: 0,
            column: None,
            code: None,
        }
    }

    pub fn at(mut self, line: usize, column: Option<usize>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
