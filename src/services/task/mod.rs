//! Task Loop
//!
//! The agentic task engine: task state, the controller driving the
//! request/tool loop, resume reconstruction and the interfaces to the host
//! running the task.

pub mod controller;
pub mod environment;
pub mod host;
pub mod prompts;
pub mod resume;
pub mod session;
pub mod state;
pub mod system_prompt;

pub use controller::{TaskLoopController, TaskLoopDeps};
pub use host::{Ask, AskResponse, HostRetryApprover, SayKind, TaskHost};
pub use resume::{reconstruct, ResumePlan};
pub use session::TaskSession;
pub use state::{TaskMetrics, TaskOutcome, TaskState, TaskStatus};
