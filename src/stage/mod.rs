//! The stage: runtime facade, directory, dead letters, logging and timing.

pub(crate) mod dead_letter;
mod directory;
mod logger;
#[allow(clippy::module_inception)]
mod stage;
mod timer;

pub use self::dead_letter::{DeadLetter, DeadLetterListener, DeadLetterReason, DeadLetters};
pub use self::directory::{Directory, DirectoryConfig};
pub use self::logger::{default_log, LoggerConfig};
pub use self::stage::{stage, SpawnOptions, Stage, StageBuilder, StageError};
pub use self::timer::{ScheduleId, Scheduler};
