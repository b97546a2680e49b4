use std::io;
use thiserror::Error;

/// Errors surfaced by the apiary runtime.
///
/// Remote failures are carried verbatim: a peer's error text is never
/// reinterpreted on the way back to the caller.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HiveError {
  // --- I/O Errors ---
  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  // --- Transport Errors ---
  #[error("invalid node address: {0}")]
  InvalidAddress(String),
  #[error("transport error: {0}")]
  Transport(String),
  /// Error text reported by a remote node, verbatim.
  #[error("{0}")]
  Remote(String),

  // --- Encoding Errors ---
  #[error("encode/decode error: {0}")]
  Codec(String),
  /// Malformed or truncated wire frame. External input, reported gracefully;
  /// internal framing bookkeeping bugs abort instead.
  #[error("malformed wire frame: {0}")]
  Wire(String),

  // --- Registration Errors ---
  #[error("a handler for message type {0} is already registered")]
  DuplicateHandler(String),
  #[error("a detached handler is already registered for this app")]
  DuplicateDetached,
  #[error("an app named {0} already exists on this hive")]
  DuplicateApp(String),

  // --- Actor/Queue Errors ---
  #[error("mailbox closed")]
  MailboxClosed,
  #[error("command dropped without a reply")]
  NoReply,
  #[error("unknown bee: {0}")]
  UnknownBee(String),
  #[error("unsupported command for this actor: {0}")]
  UnsupportedCommand(&'static str),

  // --- State Errors ---
  #[error("operation is invalid for the current hive state: {0}")]
  InvalidState(&'static str),

  // --- Timeouts ---
  #[error("operation timed out")]
  Timeout,

  // --- Internal Errors ---
  #[error("internal runtime error: {0}")]
  Internal(String),
}

impl From<reqwest::Error> for HiveError {
  fn from(e: reqwest::Error) -> Self {
    HiveError::Transport(e.to_string())
  }
}

impl From<bincode::Error> for HiveError {
  fn from(e: bincode::Error) -> Self {
    HiveError::Codec(e.to_string())
  }
}

impl From<serde_json::Error> for HiveError {
  fn from(e: serde_json::Error) -> Self {
    HiveError::Codec(e.to_string())
  }
}
