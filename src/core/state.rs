//! 状态投影：ScreenSnapshot
//!
//! UI 只持有轻量的快照（阶段、诊断结果、对话、锁）；真实状态由 DiagnosisScreen 维护并投影出来。

use serde::Serialize;

use crate::chat::ChatTurn;
use crate::diagnosis::DiagnosisResult;

/// 页面阶段（UI 投影用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScreenPhase {
    /// 尚未提交诊断
    Idle,
    Diagnosing,
    /// 已有诊断结果，可追问
    Ready,
    Sending,
    TornDown,
}

/// UI 看到的「投影」状态
#[derive(Clone, Debug, Serialize)]
pub struct ScreenSnapshot {
    pub phase: ScreenPhase,
    pub result: Option<DiagnosisResult>,
    pub turns: Vec<ChatTurn>,
    /// 诊断或发送进行中，触发按钮应禁用
    pub input_locked: bool,
    pub chat_enabled: bool,
}

impl ScreenSnapshot {
    pub fn new(phase: ScreenPhase, result: Option<DiagnosisResult>, turns: Vec<ChatTurn>) -> Self {
        let chat_enabled = result.is_some() && phase != ScreenPhase::TornDown;
        Self {
            phase,
            input_locked: matches!(phase, ScreenPhase::Diagnosing | ScreenPhase::Sending),
            result,
            turns,
            chat_enabled,
        }
    }
}
