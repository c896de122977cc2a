//! HTTP 后端：reqwest 调用诊断服务与对话服务（两个独立主机）
//!
//! 传输错误 → NetworkUnreachable；非 2xx → ServiceUnavailable（带状态码与响应文本）；2xx 但体不合法 → MalformedResponse。

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::traits::{
    ChatRequestBody, ChatResponseBody, DiagnoseRequestBody, DiagnoseResponseBody, ExpertBackend,
};
use crate::config::BackendSection;
use crate::core::ServiceError;

pub struct HttpBackend {
    client: Client,
    diagnosis_base_url: String,
    chat_base_url: String,
}

impl HttpBackend {
    pub fn new(diagnosis_base_url: &str, chat_base_url: &str) -> Self {
        Self::with_client(Client::new(), diagnosis_base_url, chat_base_url)
    }

    pub fn with_client(client: Client, diagnosis_base_url: &str, chat_base_url: &str) -> Self {
        Self {
            client,
            diagnosis_base_url: diagnosis_base_url.trim_end_matches('/').to_string(),
            chat_base_url: chat_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 按 [backend] 配置建立客户端（含连接 / 请求超时）
    pub fn from_config(section: &BackendSection) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(section.timeouts.connect_timeout())
            .timeout(section.timeouts.request_timeout())
            .build()?;
        Ok(Self::with_client(
            client,
            &section.diagnosis_base_url,
            &section.chat_base_url,
        ))
    }

    async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(transport_error)?;
        decode_response(status, &text)
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    tracing::debug!(error = %err, timeout = err.is_timeout(), "transport error");
    ServiceError::NetworkUnreachable(err.to_string())
}

/// 将状态码与响应文本映射为领域结果（与传输无关，便于单测）
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ServiceError> {
    if !(200..300).contains(&status) {
        return Err(ServiceError::ServiceUnavailable {
            status,
            body: body.trim().to_string(),
        });
    }
    serde_json::from_str(body).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl ExpertBackend for HttpBackend {
    async fn diagnose(&self, body: &DiagnoseRequestBody) -> Result<DiagnoseResponseBody, ServiceError> {
        let url = format!("{}/api/diagnose", self.diagnosis_base_url);
        tracing::debug!(%url, "POST diagnose");
        self.post_json(&url, body).await
    }

    async fn chat(&self, body: &ChatRequestBody) -> Result<ChatResponseBody, ServiceError> {
        let url = format!("{}/api/chat", self.chat_base_url);
        tracing::debug!(%url, session_id = %body.session_id, "POST chat");
        self.post_json(&url, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_body() {
        let body: ChatResponseBody =
            decode_response(200, r#"{"response":"Apply copper spray"}"#).unwrap();
        assert_eq!(body.response, "Apply copper spray");
    }

    #[test]
    fn test_decode_non_2xx_is_service_unavailable() {
        let err = decode_response::<ChatResponseBody>(500, "boom\n").unwrap_err();
        assert_eq!(
            err,
            ServiceError::ServiceUnavailable {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[test]
    fn test_decode_missing_field_is_malformed() {
        let err = decode_response::<DiagnoseResponseBody>(200, r#"{"session_id":"s1"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn test_decode_non_json_is_malformed() {
        let err = decode_response::<ChatResponseBody>(204, "").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = HttpBackend::new("http://a:8000/", "http://b:8005//");
        assert_eq!(backend.diagnosis_base_url, "http://a:8000");
        assert_eq!(backend.chat_base_url, "http://b:8005");
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_unreachable() {
        // 本机 1 号端口无人监听，连接会被拒绝
        let client = Client::builder().no_proxy().build().unwrap();
        let backend = HttpBackend::with_client(client, "http://127.0.0.1:1", "http://127.0.0.1:1");
        let err = backend
            .chat(&ChatRequestBody {
                message: "hello".into(),
                session_id: "s1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NetworkUnreachable(_)));
    }
}
