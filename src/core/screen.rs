//! 诊断页面编排：媒体适配 → 诊断客户端 → 追问会话
//!
//! 一个 DiagnosisScreen 在页面生命周期内独占当前的 (DiagnosisResult, ChatSession)。
//! 状态只在两个网络调用之外加锁修改；网络调用返回后先检查页面是否已销毁、会话是否已被新诊断替换，再决定是否写回。
//! teardown 与写回在同一把锁下互斥：写回要么整个发生在销毁之前，要么看到已销毁而放弃。

use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{ExpertBackend, HttpBackend};
use crate::capture::{adapt, Capture};
use crate::chat::{ChatSession, ChatSessionManager, ChatTurn, PendingSend};
use crate::config::{AppConfig, DiagnosisSection};
use crate::core::error::SessionError;
use crate::core::session_supervisor::ScreenSupervisor;
use crate::core::state::{ScreenPhase, ScreenSnapshot};
use crate::diagnosis::{ClientPhase, DiagnosisClient, DiagnosisResult};

#[derive(Default)]
struct ScreenInner {
    result: Option<DiagnosisResult>,
    session: Option<ChatSession>,
    /// 每次诊断写回时 +1；追问回复只写回同一代的会话
    generation: u64,
}

pub struct DiagnosisScreen {
    diagnosis: DiagnosisClient,
    chat: ChatSessionManager,
    supervisor: ScreenSupervisor,
    inner: Mutex<ScreenInner>,
}

/// 追问等待回复期间持有；调用被丢弃时释放会话的 Sending 状态
struct InFlight<'a> {
    screen: &'a DiagnosisScreen,
    pending: &'a PendingSend,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.screen.lock();
        if inner.generation == self.generation {
            if let Some(session) = inner.session.as_mut() {
                session.cancel_send(self.pending);
            }
        }
    }
}

impl DiagnosisScreen {
    pub fn new(backend: Arc<dyn ExpertBackend>, settings: DiagnosisSection) -> Self {
        Self {
            diagnosis: DiagnosisClient::new(backend.clone(), settings),
            chat: ChatSessionManager::new(backend),
            supervisor: ScreenSupervisor::new(),
            inner: Mutex::new(ScreenInner::default()),
        }
    }

    /// 按配置建立 HTTP 后端
    pub fn from_config(cfg: &AppConfig) -> Result<Self, reqwest::Error> {
        let backend = HttpBackend::from_config(&cfg.backend)?;
        Ok(Self::new(Arc::new(backend), cfg.diagnosis.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, ScreenInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.supervisor.is_torn_down() {
            return Err(SessionError::TornDown);
        }
        Ok(())
    }

    /// 提交一次采集结果。成功或降级都会建立新的会话，之前的对话被丢弃
    pub async fn submit_capture(&self, capture: &Capture) -> Result<DiagnosisResult, SessionError> {
        self.ensure_alive()?;
        let request = adapt(capture)?;

        let token = self.supervisor.child_token();
        let result = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("screen torn down during diagnosis, result dropped");
                return Err(SessionError::TornDown);
            }
            submitted = self.diagnosis.submit(&request) => submitted?,
        };

        let mut inner = self.lock();
        self.ensure_alive()?;
        if let Some(previous) = inner.session.as_ref() {
            if !previous.turns().is_empty() {
                tracing::info!(
                    previous = previous.session_id(),
                    turns = previous.turns().len(),
                    "new diagnosis replaces previous chat history"
                );
            }
        }
        inner.session = Some(ChatSession::for_result(&result));
        inner.result = Some(result.clone());
        inner.generation += 1;
        Ok(result)
    }

    /// 在当前会话上追问；返回追加的机器人回复（成功文本或致歉）
    pub async fn send_message(&self, text: &str) -> Result<ChatTurn, SessionError> {
        self.ensure_alive()?;
        let (pending, generation) = {
            let mut inner = self.lock();
            let generation = inner.generation;
            let session = inner.session.as_mut().ok_or(SessionError::NoActiveSession)?;
            (session.begin_send(text)?, generation)
        };

        let mut in_flight = InFlight {
            screen: self,
            pending: &pending,
            generation,
            settled: false,
        };

        let token = self.supervisor.child_token();
        let outcome = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(session_id = %pending.request().session_id, "screen torn down during chat send, reply dropped");
                return Err(SessionError::TornDown);
            }
            outcome = self.chat.exchange(&pending) => outcome,
        };
        in_flight.settled = true;

        let mut inner = self.lock();
        self.ensure_alive()?;
        if inner.generation != generation {
            tracing::debug!(session_id = %pending.request().session_id, "session replaced during chat send, reply dropped");
            return Err(SessionError::SessionSuperseded);
        }
        let session = inner.session.as_mut().ok_or(SessionError::NoActiveSession)?;
        let reply = session.complete_send(&pending, outcome).clone();
        Ok(reply)
    }

    /// 页面销毁：进行中的调用立即返回，迟到结果不再写回
    pub fn teardown(&self) {
        let _inner = self.lock();
        if !self.supervisor.is_torn_down() {
            tracing::info!("diagnosis screen torn down");
        }
        self.supervisor.teardown();
    }

    pub fn current_result(&self) -> Option<DiagnosisResult> {
        self.lock().result.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.session_id().to_string())
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        let inner = self.lock();
        let sending = inner.session.as_ref().is_some_and(|s| s.is_sending());
        let phase = if self.supervisor.is_torn_down() {
            ScreenPhase::TornDown
        } else if self.diagnosis.phase() == ClientPhase::Submitting {
            ScreenPhase::Diagnosing
        } else if sending {
            ScreenPhase::Sending
        } else if inner.result.is_some() {
            ScreenPhase::Ready
        } else {
            ScreenPhase::Idle
        };
        let turns = inner
            .session
            .as_ref()
            .map(|s| s.turns().to_vec())
            .unwrap_or_default();
        ScreenSnapshot::new(phase, inner.result.clone(), turns)
    }
}
