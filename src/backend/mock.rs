//! Mock 后端（用于测试与 --mock 离线运行，无需服务端）
//!
//! 可按端点预置响应脚本；脚本用尽后诊断返回新的 UUID 会话，对话回显用户消息。
//! 可按端点设置 gate：调用先等待一次 notify 再应答，便于测试观察「进行中」状态。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::backend::traits::{
    ChatRequestBody, ChatResponseBody, DiagnoseRequestBody, DiagnoseResponseBody, ExpertBackend,
};
use crate::core::ServiceError;

#[derive(Default)]
struct Script {
    diagnose: VecDeque<Result<DiagnoseResponseBody, ServiceError>>,
    chat: VecDeque<Result<ChatResponseBody, ServiceError>>,
    diagnose_calls: Vec<DiagnoseRequestBody>,
    chat_calls: Vec<ChatRequestBody>,
}

#[derive(Default)]
pub struct MockBackend {
    script: Mutex<Script>,
    diagnose_gate: Option<Arc<Notify>>,
    chat_gate: Option<Arc<Notify>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次诊断在应答前等待 gate 的一次 notify_one
    pub fn with_diagnose_gate(mut self, gate: Arc<Notify>) -> Self {
        self.diagnose_gate = Some(gate);
        self
    }

    /// 每次追问在应答前等待 gate 的一次 notify_one
    pub fn with_chat_gate(mut self, gate: Arc<Notify>) -> Self {
        self.chat_gate = Some(gate);
        self
    }

    pub fn push_diagnose(&self, outcome: Result<DiagnoseResponseBody, ServiceError>) {
        self.lock().diagnose.push_back(outcome);
    }

    pub fn push_chat(&self, outcome: Result<ChatResponseBody, ServiceError>) {
        self.lock().chat.push_back(outcome);
    }

    pub fn diagnose_calls(&self) -> Vec<DiagnoseRequestBody> {
        self.lock().diagnose_calls.clone()
    }

    pub fn chat_calls(&self) -> Vec<ChatRequestBody> {
        self.lock().chat_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn wait_gate(gate: &Option<Arc<Notify>>) {
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

#[async_trait]
impl ExpertBackend for MockBackend {
    async fn diagnose(&self, body: &DiagnoseRequestBody) -> Result<DiagnoseResponseBody, ServiceError> {
        let scripted = {
            let mut script = self.lock();
            script.diagnose_calls.push(body.clone());
            script.diagnose.pop_front()
        };
        wait_gate(&self.diagnose_gate).await;

        scripted.unwrap_or_else(|| {
            Ok(DiagnoseResponseBody {
                session_id: uuid::Uuid::new_v4().to_string(),
                response: format!("Mock diagnosis for: {}", body.disease_image_description),
                confidence: None,
                disease_name: None,
                solutions: Some(vec!["Remove affected leaves".into()]),
                causes: None,
                symptoms: None,
                prevention: None,
            })
        })
    }

    async fn chat(&self, body: &ChatRequestBody) -> Result<ChatResponseBody, ServiceError> {
        let scripted = {
            let mut script = self.lock();
            script.chat_calls.push(body.clone());
            script.chat.pop_front()
        };
        wait_gate(&self.chat_gate).await;

        scripted.unwrap_or_else(|| {
            Ok(ChatResponseBody {
                response: format!("Echo from Mock: {}", body.message),
            })
        })
    }
}
