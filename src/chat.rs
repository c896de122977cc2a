//! 追问会话：用户消息立即入列，按会话 ID 发往对话服务，再追加机器人回复或致歉消息
//!
//! 每次 send 的状态机 Idle → Sending → Appended(bot | apology)；同一会话严格串行，发送中再次 send 返回 SendInProgress。
//! 用户消息一经追加不会撤回；失败只影响回复文案（按 FailureCause 选择）。

use std::sync::Arc;

use serde::Serialize;

use crate::backend::{ChatRequestBody, ExpertBackend};
use crate::core::{FailureCause, ServiceError, SessionError};
use crate::diagnosis::DiagnosisResult;

const APOLOGY_PREFIX: &str = "I'm having trouble connecting to the server. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub text: String,
    pub sender: Sender,
    pub sequence: u64,
}

/// 失败时追加给用户看的致歉文案
pub fn apology_text(cause: FailureCause) -> String {
    let hint = match cause {
        FailureCause::NetworkUnreachable => "Please check your internet connection and try again.",
        FailureCause::ServiceUnavailable => {
            "Please make sure the chat service is running and try again."
        }
        FailureCause::Unknown => "Please try asking your question again.",
    };
    format!("{}{}", APOLOGY_PREFIX, hint)
}

/// 已追加用户消息、等待回复的一次发送
#[derive(Debug, Clone)]
pub struct PendingSend {
    request: ChatRequestBody,
    user_sequence: u64,
}

impl PendingSend {
    pub fn request(&self) -> &ChatRequestBody {
        &self.request
    }

    pub fn user_sequence(&self) -> u64 {
        self.user_sequence
    }
}

/// 与一次诊断绑定的对话；turns 只追加不重排
#[derive(Debug, Clone)]
pub struct ChatSession {
    session_id: String,
    turns: Vec<ChatTurn>,
    next_sequence: u64,
    /// 正在等待回复的用户消息序号
    in_flight: Option<u64>,
}

impl ChatSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            next_sequence: 1,
            in_flight: None,
        }
    }

    pub fn for_result(result: &DiagnosisResult) -> Self {
        Self::new(result.session_id.clone())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    fn push(&mut self, text: String, sender: Sender) -> &ChatTurn {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.turns.push(ChatTurn { text, sender, sequence });
        &self.turns[self.turns.len() - 1]
    }

    /// 校验并立即追加用户消息（原文不做修改），进入 Sending
    pub fn begin_send(&mut self, text: &str) -> Result<PendingSend, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if self.in_flight.is_some() {
            return Err(SessionError::SendInProgress);
        }

        let user_sequence = self.push(text.to_string(), Sender::User).sequence;
        self.in_flight = Some(user_sequence);
        Ok(PendingSend {
            request: ChatRequestBody {
                message: text.to_string(),
                session_id: self.session_id.clone(),
            },
            user_sequence,
        })
    }

    /// 追加机器人回复（成功为服务端文本，失败为致歉），回到 Idle
    pub fn complete_send(
        &mut self,
        pending: &PendingSend,
        outcome: Result<String, ServiceError>,
    ) -> &ChatTurn {
        if self.in_flight == Some(pending.user_sequence) {
            self.in_flight = None;
        }
        let text = match outcome {
            Ok(reply) => reply,
            Err(err) => apology_text(err.cause()),
        };
        self.push(text, Sender::Bot)
    }

    /// 放弃等待回复（调用被丢弃）；用户消息保留
    pub fn cancel_send(&mut self, pending: &PendingSend) {
        if self.in_flight == Some(pending.user_sequence) {
            self.in_flight = None;
        }
    }
}

/// send 期间持有会话；future 被丢弃时释放 Sending 状态
struct SendGuard<'a> {
    session: &'a mut ChatSession,
    pending: PendingSend,
    completed: bool,
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.session.cancel_send(&self.pending);
        }
    }
}

pub struct ChatSessionManager {
    backend: Arc<dyn ExpertBackend>,
}

impl ChatSessionManager {
    pub fn new(backend: Arc<dyn ExpertBackend>) -> Self {
        Self { backend }
    }

    /// 网络部分：只返回回复文本或失败分类，不接触会话状态
    pub async fn exchange(&self, pending: &PendingSend) -> Result<String, ServiceError> {
        let request = pending.request();
        let outcome = self.backend.chat(request).await.and_then(|resp| {
            if resp.response.trim().is_empty() {
                Err(ServiceError::MalformedResponse("empty chat response".into()))
            } else {
                Ok(resp)
            }
        });
        match outcome {
            Ok(resp) => {
                tracing::info!(session_id = %request.session_id, sequence = pending.user_sequence(), "chat reply received");
                Ok(resp.response)
            }
            Err(err) => {
                tracing::warn!(session_id = %request.session_id, error = %err, "chat send failed");
                Err(err)
            }
        }
    }

    /// 完整的一次追问：用户消息 + 回复（或致歉）两条，返回追加的回复
    pub async fn send(&self, session: &mut ChatSession, text: &str) -> Result<ChatTurn, SessionError> {
        let pending = session.begin_send(text)?;
        let mut guard = SendGuard {
            session,
            pending,
            completed: false,
        };

        let outcome = self.exchange(&guard.pending).await;

        guard.completed = true;
        let pending = guard.pending.clone();
        let reply = guard.session.complete_send(&pending, outcome).clone();
        Ok(reply)
    }
}
