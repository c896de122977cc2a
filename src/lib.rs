//! crop-doctor - 作物病害诊断会话编排
//!
//! 模块划分：
//! - **backend**: 专家后端抽象与实现（HTTP / Mock）
//! - **capture**: 媒体采集结果 → 诊断请求
//! - **chat**: 追问会话（用户消息、机器人回复、致歉）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、状态投影、页面生命周期与编排
//! - **diagnosis**: 诊断客户端（成功 / 降级结果）
//! - **observability**: 日志初始化

pub mod backend;
pub mod capture;
pub mod chat;
pub mod config;
pub mod core;
pub mod diagnosis;
pub mod observability;

pub use crate::capture::{adapt, Capture, DiagnosisRequest, MediaKind};
pub use crate::chat::{ChatSession, ChatSessionManager, ChatTurn, Sender};
pub use crate::core::{DiagnosisScreen, FailureCause, ServiceError, SessionError};
pub use crate::diagnosis::{DiagnosisClient, DiagnosisResult, Severity};
