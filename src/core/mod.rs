//! 核心编排层：错误分类、状态投影、页面生命周期、诊断页面编排

pub mod error;
pub mod screen;
pub mod session_supervisor;
pub mod state;

pub use error::{FailureCause, ServiceError, SessionError};
pub use screen::DiagnosisScreen;
pub use session_supervisor::ScreenSupervisor;
pub use state::{ScreenPhase, ScreenSnapshot};
