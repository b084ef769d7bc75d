use std::collections::BTreeSet;

use serde::Serialize;

use crate::{error::GatewayError, protocol::MSG_WINDOW_COMMAND};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WindowCommand {
    Open,
    Close,
    ManualOpen,
    ManualClose,
    /// Reserved; nothing in the press state machine produces it.
    ShortOpen,
}

impl WindowCommand {
    pub const BUILT_IN: [WindowCommand; 5] = [
        Self::Open,
        Self::Close,
        Self::ManualOpen,
        Self::ManualClose,
        Self::ShortOpen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::ManualOpen => "manual_open",
            Self::ManualClose => "manual_close",
            Self::ShortOpen => "short_open",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: String,
}

pub fn is_valid_identifier(command: &str) -> bool {
    !command.is_empty() && command.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
}

#[derive(Debug, Clone)]
pub struct CommandGateway {
    allowed: BTreeSet<String>,
}

impl Default for CommandGateway {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl CommandGateway {
    pub fn with_extras<I, S>(extras: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed: BTreeSet<String> = WindowCommand::BUILT_IN
            .iter()
            .map(|command| command.as_str().to_string())
            .collect();
        let mut rejected = Vec::new();

        for extra in extras {
            let extra = extra.into();
            if is_valid_identifier(&extra) {
                allowed.insert(extra);
            } else {
                rejected.push(extra);
            }
        }

        (Self { allowed }, rejected)
    }

    pub fn new<I, S>(extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_extras(extras).0
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed.contains(command)
    }

    pub fn validate(&self, command: &str) -> Result<CommandFrame, GatewayError> {
        if !is_valid_identifier(command) {
            return Err(GatewayError::InvalidSyntax(command.to_string()));
        }
        if !self.is_allowed(command) {
            return Err(GatewayError::NotAllowed(command.to_string()));
        }
        Ok(CommandFrame {
            kind: MSG_WINDOW_COMMAND,
            command: command.to_string(),
        })
    }

    pub fn encode(&self, command: &str) -> Result<String, GatewayError> {
        let frame = self.validate(command)?;
        Ok(serde_json::to_string(&frame)?)
    }

    pub fn encode_command(&self, command: WindowCommand) -> Result<String, GatewayError> {
        self.encode(command.as_str())
    }
}
