//! 核心编排层：错误与恢复、会话状态与事件、调度与限流、交互实现、会话主控循环、引擎装配、优雅关闭

pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod pacing;
pub mod rate_limit;
pub mod realizer;
pub mod recovery;
pub mod session_supervisor;
pub mod shutdown;
pub mod state;
pub mod task_scheduler;

pub use engine::{Engine, EngineBuilder, SessionHandle, SessionRequest};
pub use error::{FlouError, ParseError};
pub use events::{EventBus, SessionEvent};
pub use executor::{DryRunExecutor, ExecutionOutcome, InteractionExecutor};
pub use orchestrator::{SessionOrchestrator, SessionReport, SessionRuntime};
pub use pacing::Pacing;
pub use rate_limit::RateLimiter;
pub use realizer::Realizer;
pub use recovery::{ProviderAction, RecoveryEngine, TickAction};
pub use session_supervisor::{SessionLease, SessionSupervisor};
pub use shutdown::{
    MemoryReportCleanup, MetricsReportCleanup, ShutdownCleanup, ShutdownCoordinator,
    ShutdownManager, ShutdownReason,
};
pub use state::{SessionPhase, SessionStatus};
pub use task_scheduler::{SessionPermit, SessionScheduler};
