use thiserror::Error;

/// Failures from decoding or encoding a wire [`crate::message::Message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed message: fewer than four frames")]
    Malformed,
    #[error("protocol version too new")]
    VersionTooNew,
    #[error("sender frame is empty")]
    EmptySender,
}

/// Standard policy-level rejections the router replies to a sender with.
///
/// Each variant maps to exactly one of the standard error strings in the wire
/// protocol; `reply_text` is the single place that mapping happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("You did not sign in!")]
    NotSignedIn,
    #[error("The name is already taken.")]
    DuplicateName,
    #[error("Node is not known.")]
    NodeUnknown,
    #[error("Receiver is not in addresses list.")]
    ReceiverUnknown,
    #[error("Execution of the action failed.")]
    ExecutionFailed,
    #[error("You are not you!")]
    NotYou,
}

impl PolicyError {
    /// The exact human string sent back on the wire for this rejection.
    pub fn reply_text(&self) -> &'static str {
        match self {
            PolicyError::NotSignedIn => "You did not sign in!",
            PolicyError::DuplicateName => "The name is already taken.",
            PolicyError::NodeUnknown => "Node is not known.",
            PolicyError::ReceiverUnknown => "Receiver is not in addresses list.",
            PolicyError::ExecutionFailed => "Execution of the action failed.",
            PolicyError::NotYou => "You are not you!",
        }
    }
}
