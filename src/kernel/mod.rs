//! Message dispatch internals: invocations, queues and mailboxes.

pub(crate) mod invocation;
pub(crate) mod mailbox;
mod queue;

pub use self::invocation::{Completion, DropReason, Invocation};
pub use self::mailbox::{Mailbox, MailboxConfig, MailboxState, OverflowPolicy};
