//! Operator commands: parsing, execution and the framed serial transport.

pub mod dispatcher;
pub mod frame;
pub mod parse;
pub mod transport;

use serde::Serialize;
use thiserror::Error;

use crate::controller::TopUpError;
use crate::notify::SendError;
use crate::store::StoreError;

pub use dispatcher::CommandDispatcher;
pub use frame::{FrameCodec, MAX_PAYLOAD_LEN};
pub use parse::Command;
pub use transport::serve_frames;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Meter is shutting down")]
    ShuttingDown,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Notification failed: {0}")]
    Notify(#[from] SendError),
}

impl From<TopUpError> for CommandError {
    fn from(error: TopUpError) -> Self {
        match error {
            TopUpError::Ledger(e) => CommandError::Validation(e.to_string()),
            TopUpError::Store(e) => CommandError::Store(e),
        }
    }
}

impl From<validator::ValidationErrors> for CommandError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CommandError::Validation(errors.to_string())
    }
}

/// Acknowledgement of an executed command.
///
/// Queries carry their answer in `fields`; everything else acknowledges
/// with the bare code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub code: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl Ack {
    pub fn done(code: u8) -> Self {
        Self {
            code,
            fields: Vec::new(),
        }
    }

    pub fn reply(code: u8, fields: Vec<String>) -> Self {
        Self { code, fields }
    }

    /// Payload of the reply frame, `None` for plain acknowledgements.
    pub fn reply_payload(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        let mut payload = self.code.to_string();
        for field in &self.fields {
            payload.push(',');
            payload.push_str(field);
        }
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_payload_joins_code_and_fields() {
        let ack = Ack::reply(6, vec!["1999.94".into(), "0.06".into()]);
        assert_eq!(ack.reply_payload().as_deref(), Some("6,1999.94,0.06"));
        assert_eq!(Ack::done(4).reply_payload(), None);
    }
}
