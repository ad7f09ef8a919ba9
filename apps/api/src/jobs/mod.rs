pub mod orchestrator;
pub mod retry;
pub mod sync;
pub mod worker;

pub use orchestrator::{Orchestrator, SubmitError, SubmitPhase, Submission};
pub use retry::RetryPolicy;
pub use sync::{SyncCompiler, SyncError};
pub use worker::{CompileWorker, Processed};
