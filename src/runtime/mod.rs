// src/runtime/mod.rs

//! Core asynchronous primitives: mailboxes, control commands, completion
//! signals.

pub mod command;
pub mod latch;
pub mod mailbox;
pub mod waitgroup;

pub use command::{CmdData, CmdOk, CmdReply, ControlCmd};
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender, DEFAULT_CTRL_CAPACITY, DEFAULT_DATA_CAPACITY};

pub(crate) use latch::DoneLatch;
pub(crate) use waitgroup::WaitGroup;
