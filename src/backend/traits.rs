//! 专家后端抽象与线格式
//!
//! 诊断、对话两个端点都走 JSON over HTTP；实现 ExpertBackend 的有 HttpBackend（reqwest）与 MockBackend（测试 / 离线）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::DiagnosisRequest;
use crate::core::ServiceError;

/// POST /api/diagnose 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnoseRequestBody {
    pub disease_image_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
}

impl From<&DiagnosisRequest> for DiagnoseRequestBody {
    fn from(req: &DiagnosisRequest) -> Self {
        Self {
            disease_image_description: req.description().to_string(),
            crop_type: req.crop_type().map(String::from),
            symptoms: req.symptoms().map(String::from),
        }
    }
}

/// POST /api/diagnose 的 2xx 响应体；session_id 与 response 必填，其余字段缺省或为 null 均可
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnoseResponseBody {
    pub session_id: String,
    pub response: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub disease_name: Option<String>,
    #[serde(default)]
    pub solutions: Option<Vec<String>>,
    #[serde(default)]
    pub causes: Option<Vec<String>>,
    #[serde(default)]
    pub symptoms: Option<Vec<String>>,
    #[serde(default)]
    pub prevention: Option<Vec<String>>,
}

/// POST /api/chat 请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequestBody {
    pub message: String,
    pub session_id: String,
}

/// POST /api/chat 的 2xx 响应体
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseBody {
    pub response: String,
}

/// 专家后端：诊断与追问两个调用，失败统一归类为 ServiceError
#[async_trait]
pub trait ExpertBackend: Send + Sync {
    async fn diagnose(&self, body: &DiagnoseRequestBody) -> Result<DiagnoseResponseBody, ServiceError>;

    async fn chat(&self, body: &ChatRequestBody) -> Result<ChatResponseBody, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnose_body_omits_absent_optionals() {
        let body = DiagnoseRequestBody {
            disease_image_description: "leaf spots".into(),
            crop_type: None,
            symptoms: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"disease_image_description": "leaf spots"}));
    }

    #[test]
    fn test_diagnose_response_defaults_lists() {
        let body: DiagnoseResponseBody =
            serde_json::from_str(r#"{"session_id":"s1","response":"Likely blight"}"#).unwrap();
        assert_eq!(body.session_id, "s1");
        assert!(body.confidence.is_none());
        assert!(body.solutions.is_none());
        assert!(body.prevention.is_none());
    }

    #[test]
    fn test_diagnose_response_accepts_null_lists() {
        let body: DiagnoseResponseBody = serde_json::from_str(
            r#"{"session_id":"s1","response":"Likely blight","confidence":0.9,"disease_name":null,"solutions":null,"causes":null,"symptoms":["Dark lesions"],"prevention":null}"#,
        )
        .unwrap();
        assert!(body.disease_name.is_none());
        assert!(body.solutions.is_none());
        assert_eq!(body.symptoms.as_deref(), Some(&["Dark lesions".to_string()][..]));
    }

    #[test]
    fn test_diagnose_response_requires_session_id() {
        let parsed = serde_json::from_str::<DiagnoseResponseBody>(r#"{"response":"x"}"#);
        assert!(parsed.is_err());
    }
}
