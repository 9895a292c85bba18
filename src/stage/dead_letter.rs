use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use slog::{info, warn, Logger};

use crate::actor::Address;

/// Why an invocation became a dead letter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The target actor was stopped.
    ActorStopped,
    /// A bounded mailbox refused the invocation.
    MailboxFull,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeadLetterReason::ActorStopped => f.write_str("actor stopped"),
            DeadLetterReason::MailboxFull => f.write_str("mailbox full"),
        }
    }
}

/// Record of an invocation that could not be delivered.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    recipient: Address,
    representation: Arc<str>,
    reason: DeadLetterReason,
}

impl DeadLetter {
    pub(crate) fn new(recipient: Address, representation: Arc<str>, reason: DeadLetterReason) -> Self {
        DeadLetter {
            recipient,
            representation,
            reason,
        }
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// The `"method(arg1,arg2)"` projection of the undeliverable invocation.
    pub fn representation(&self) -> &str {
        &self.representation
    }

    pub fn reason(&self) -> DeadLetterReason {
        self.reason
    }
}

impl fmt::Display for DeadLetter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DeadLetter[{} => {} ({})]",
            self.representation, self.recipient, self.reason
        )
    }
}

/// Observer of dead letters.
pub trait DeadLetterListener: Send + Sync + 'static {
    fn handle(&self, letter: &DeadLetter);
}

/// The stage-wide dead-letter sink.
///
/// Each record is logged through the target actor's logger, then handed to
/// every subscribed listener. A panicking listener is logged and does not
/// keep the remaining listeners from running.
pub struct DeadLetters {
    listeners: RwLock<Vec<Arc<dyn DeadLetterListener>>>,
}

impl DeadLetters {
    pub(crate) fn new() -> Self {
        DeadLetters {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn DeadLetterListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub(crate) fn publish(&self, letter: DeadLetter, logger: &Logger) {
        info!(logger, "dead letter";
              "recipient" => %letter.recipient(),
              "invocation" => letter.representation(),
              "reason" => %letter.reason());

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.handle(&letter))).is_err() {
                warn!(logger, "dead-letter listener panicked";
                      "invocation" => letter.representation());
            }
        }
    }
}
