//! 错误分类：本地拒绝（SessionError）与远端失败（ServiceError）
//!
//! 远端失败在组件边界被转换为领域数据（降级诊断结果或致歉回复），不会向调用方冒泡。

use thiserror::Error;

/// 本地拒绝：发生在任何网络调用之前，或属于并发保护
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Malformed capture: {0}")]
    MalformedCapture(String),

    /// 诊断提交中，重复提交被拒绝（UI 应禁用触发按钮）
    #[error("Diagnosis already in progress")]
    AlreadyInProgress,

    /// 同一会话上一条消息尚未返回
    #[error("Chat send already in progress")]
    SendInProgress,

    #[error("Message is empty")]
    EmptyMessage,

    /// 尚未完成任何诊断，没有可用的会话
    #[error("No active diagnosis session")]
    NoActiveSession,

    /// 等待期间有新的诊断替换了会话，迟到的回复被丢弃
    #[error("Chat session was replaced by a newer diagnosis")]
    SessionSuperseded,

    /// 页面已销毁，不再接受任何操作
    #[error("Screen has been torn down")]
    TornDown,
}

/// 远端调用失败（诊断 / 对话两个端点共用）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// 连接失败、DNS、超时等传输层错误
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// 非 2xx 状态码
    #[error("Service unavailable: {status} - {body}")]
    ServiceUnavailable { status: u16, body: String },

    /// 2xx 但响应体缺少必填字段或无法解析
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// 对话失败原因分类：只影响致歉文案，不影响控制流
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    NetworkUnreachable,
    ServiceUnavailable,
    Unknown,
}

impl ServiceError {
    pub fn cause(&self) -> FailureCause {
        match self {
            ServiceError::NetworkUnreachable(_) => FailureCause::NetworkUnreachable,
            ServiceError::ServiceUnavailable { .. } => FailureCause::ServiceUnavailable,
            ServiceError::MalformedResponse(_) => FailureCause::Unknown,
        }
    }
}
