//! 诊断客户端：提交诊断请求，得到成功结果或本地合成的降级结果
//!
//! 状态机 Idle → Submitting → Completed(success | degraded)；提交中再次 submit 返回 AlreadyInProgress。
//! 任何远端失败都不会抛给调用方：合成唯一 session_id、confidence=0、severity=unknown，保证之后的追问仍可进行。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::backend::{DiagnoseRequestBody, DiagnoseResponseBody, ExpertBackend};
use crate::capture::{DiagnosisRequest, MediaKind};
use crate::config::DiagnosisSection;
use crate::core::{ServiceError, SessionError};

/// 进程内上一次合成会话 ID 用到的毫秒值（保证严格递增）
static LAST_FALLBACK_MILLIS: AtomicI64 = AtomicI64::new(0);

/// 记住最近多少个已发放的 session_id；更早的会被挤出，不再参与重复检测
const ISSUED_HISTORY: usize = 64;

const IMAGE_FALLBACK_RECOMMENDATIONS: [&str; 3] = [
    "Check backend server status",
    "Try describing symptoms in the chat",
    "Ask about common crop diseases",
];

const AUDIO_FALLBACK_RECOMMENDATIONS: [&str; 4] = [
    "Ask me about common crop diseases",
    "Describe the symptoms in text",
    "Get general treatment advice",
    "Learn about prevention methods",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Disease,
    Unknown,
}

/// 一次诊断的结果；后续提交会整体替换它，而不是修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisResult {
    pub session_id: String,
    pub confidence: f64,
    pub severity: Severity,
    pub disease: Option<String>,
    pub description: String,
    pub recommendations: Vec<String>,
    pub causes: Vec<String>,
    pub symptoms_list: Vec<String>,
    pub prevention: Vec<String>,
    /// true 表示后端失败、本地合成
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Idle,
    Submitting,
    Completed { degraded: bool },
}

pub struct DiagnosisClient {
    backend: Arc<dyn ExpertBackend>,
    settings: DiagnosisSection,
    phase: Mutex<ClientPhase>,
    /// 最近 ISSUED_HISTORY 个交给调用方的 session_id（先进先出），后端重复返回时视为异常响应
    issued: Mutex<VecDeque<String>>,
}

/// 提交期间持有；未正常完成（future 被丢弃）时把状态退回 Idle
struct SubmitGuard<'a> {
    phase: &'a Mutex<ClientPhase>,
    finished: bool,
}

impl SubmitGuard<'_> {
    fn finish(mut self, degraded: bool) {
        *lock(self.phase) = ClientPhase::Completed { degraded };
        self.finished = true;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *lock(self.phase) = ClientPhase::Idle;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl DiagnosisClient {
    pub fn new(backend: Arc<dyn ExpertBackend>, settings: DiagnosisSection) -> Self {
        Self {
            backend,
            settings,
            phase: Mutex::new(ClientPhase::Idle),
            issued: Mutex::new(VecDeque::with_capacity(ISSUED_HISTORY)),
        }
    }

    pub fn phase(&self) -> ClientPhase {
        *lock(&self.phase)
    }

    fn begin(&self) -> Result<SubmitGuard<'_>, SessionError> {
        let mut phase = lock(&self.phase);
        if *phase == ClientPhase::Submitting {
            return Err(SessionError::AlreadyInProgress);
        }
        *phase = ClientPhase::Submitting;
        Ok(SubmitGuard {
            phase: &self.phase,
            finished: false,
        })
    }

    /// 提交诊断。唯一的错误是并发保护 AlreadyInProgress；远端失败全部转为降级结果
    pub async fn submit(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, SessionError> {
        let guard = self.begin()?;
        tracing::info!(source = ?request.source(), "submitting diagnosis");

        let body = DiagnoseRequestBody::from(request);
        let outcome = self
            .backend
            .diagnose(&body)
            .await
            .and_then(|resp| self.map_success(resp));

        let result = match outcome {
            Ok(result) => {
                tracing::info!(session_id = %result.session_id, confidence = result.confidence, "diagnosis completed");
                result
            }
            Err(err) => {
                let result = self.degraded(request.source(), &err);
                tracing::warn!(error = %err, session_id = %result.session_id, "diagnosis failed, using degraded result");
                result
            }
        };

        self.remember(result.session_id.clone());
        guard.finish(result.degraded);
        Ok(result)
    }

    fn remember(&self, session_id: String) {
        let mut issued = lock(&self.issued);
        if issued.len() == ISSUED_HISTORY {
            issued.pop_front();
        }
        issued.push_back(session_id);
    }

    fn map_success(&self, resp: DiagnoseResponseBody) -> Result<DiagnosisResult, ServiceError> {
        let session_id = resp.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(ServiceError::MalformedResponse("empty session_id".to_string()));
        }
        if lock(&self.issued).contains(&session_id) {
            return Err(ServiceError::MalformedResponse(format!(
                "session_id {} was already used",
                session_id
            )));
        }

        let confidence = resp.confidence.unwrap_or(self.settings.default_confidence);
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ServiceError::MalformedResponse(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }

        Ok(DiagnosisResult {
            session_id,
            confidence,
            severity: Severity::Disease,
            disease: resp.disease_name,
            description: resp.response,
            recommendations: resp.solutions.unwrap_or_default(),
            causes: resp.causes.unwrap_or_default(),
            symptoms_list: resp.symptoms.unwrap_or_default(),
            prevention: resp.prevention.unwrap_or_default(),
            degraded: false,
        })
    }

    fn degraded(&self, source: MediaKind, err: &ServiceError) -> DiagnosisResult {
        let (description, recommendations): (String, &[&str]) = match source {
            MediaKind::Image => (
                format!(
                    "An error occurred during diagnosis: {}. Please ensure the diagnosis and chat services are running and accessible. You can still ask general questions below.",
                    err
                ),
                &IMAGE_FALLBACK_RECOMMENDATIONS[..],
            ),
            MediaKind::Audio => (
                format!(
                    "Unable to process the audio description: {}. However, I can still help you with general crop disease questions and treatments.",
                    err
                ),
                &AUDIO_FALLBACK_RECOMMENDATIONS[..],
            ),
        };

        DiagnosisResult {
            session_id: fallback_session_id(&self.settings.session_prefix),
            confidence: 0.0,
            severity: Severity::Unknown,
            disease: None,
            description,
            recommendations: recommendations.iter().map(|s| s.to_string()).collect(),
            causes: Vec::new(),
            symptoms_list: Vec::new(),
            prevention: Vec::new(),
            degraded: true,
        }
    }
}

/// `<prefix>_<millis>`；同一毫秒内多次合成时向后顺延，保证每次尝试唯一
fn fallback_session_id(prefix: &str) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut prev = LAST_FALLBACK_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1);
        match LAST_FALLBACK_MILLIS.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return format!("{}_{}", prefix, next),
            Err(actual) => prev = actual,
        }
    }
}
