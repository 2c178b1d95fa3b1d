//! Domain model (ids, task record, notification, errors, outcomes).
//!
//! I/O を一切含まない層。ports / app はここの型だけを受け渡す。

pub mod errors;
pub mod ids;
pub mod notification;
pub mod outcome;
pub mod task;

pub use errors::{BusError, DispatchError, EngineError, ErrorKind, StoreError};
pub use ids::{ParseTaskIdError, TaskId};
pub use notification::{MalformedMessage, Notification};
pub use outcome::ProcessOutcome;
pub use task::{Counts, Task, TaskStatus, TransitionError};
