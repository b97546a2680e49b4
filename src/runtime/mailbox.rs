// src/runtime/mailbox.rs

//! Type aliases for actor mailbox channels based on `async-channel`.

/// The sending end of an actor queue. Cloneable; any number of producers may
/// feed one actor.
pub type MailboxSender<T> = async_channel::Sender<T>;

/// The receiving end of an actor queue. Owned by exactly one actor task,
/// which processes items sequentially.
pub type MailboxReceiver<T> = async_channel::Receiver<T>;

/// Default capacity for an actor's bounded data queue. A full data queue
/// blocks the sender; that is the runtime's backpressure mechanism.
pub const DEFAULT_DATA_CAPACITY: usize = 1024;

/// Default capacity for an actor's control queue. Control traffic is sparse.
pub const DEFAULT_CTRL_CAPACITY: usize = 16;

/// Creates a bounded mailbox channel pair. This is the standard way to
/// create both the data and the control queue of every actor in the runtime.
pub fn mailbox<T>(capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
  async_channel::bounded(capacity.max(1))
}
