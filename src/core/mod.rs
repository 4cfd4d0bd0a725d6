//! 核心调度层：错误类型、重试执行器、准入闸门、Worker Loop、调度器、优雅关闭

pub mod admission;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use error::RunnerError;
pub use retry::{RetryExecutor, RetryOutcome, StepOutcome};
pub use scheduler::Scheduler;
pub use shutdown::{run_until_shutdown, ShutdownManager, ShutdownReason};
pub use worker::{PhaseEvent, SessionRunner, WorkerLoop, WorkerPhase};
