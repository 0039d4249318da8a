pub mod async_mode;
pub mod queue;
pub mod sequential;

pub use async_mode::{join_with_deadline, spawn_stage_worker};
pub use queue::BoundedQueue;
pub use sequential::SequentialScheduler;

/// Which scheduling mode a `Pipeline` runs under (§4.3). Selected at
/// `Pipeline::start`; switching while Running is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerMode {
    Sequential,
    Async,
}
