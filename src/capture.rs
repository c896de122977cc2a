//! 媒体提交适配：把采集组件的结果规范化为诊断请求
//!
//! 纯函数、同步、无副作用；描述规范化后为空则拒绝（MalformedCapture），调用方不得用无效请求调用诊断。

use serde::{Deserialize, Serialize};

use crate::core::SessionError;

const IMAGE_UPLOAD_DESCRIPTION: &str = "User uploaded an image for crop disease diagnosis but image analysis is required to provide accurate identification.";
const IMAGE_UPLOAD_CROP_TYPE: &str = "Unknown crop from uploaded image";
const AUDIO_DESCRIPTION: &str = "User described crop disease symptoms via audio";

/// 采集来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

/// 采集组件产出的描述载荷（对编排器不透明，只做规范化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub kind: MediaKind,
    pub description: String,
    pub crop_type: Option<String>,
    pub symptoms: Option<String>,
}

impl Capture {
    /// 图片上传：目前端上不做图像识别，只提交固定描述
    pub fn image_upload() -> Self {
        Self {
            kind: MediaKind::Image,
            description: IMAGE_UPLOAD_DESCRIPTION.to_string(),
            crop_type: Some(IMAGE_UPLOAD_CROP_TYPE.to_string()),
            symptoms: None,
        }
    }

    /// 语音描述：尚未接入语音转文字，提交固定描述
    pub fn audio_description() -> Self {
        Self {
            kind: MediaKind::Audio,
            description: AUDIO_DESCRIPTION.to_string(),
            crop_type: None,
            symptoms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_crop_type(mut self, crop_type: impl Into<String>) -> Self {
        self.crop_type = Some(crop_type.into());
        self
    }

    pub fn with_symptoms(mut self, symptoms: impl Into<String>) -> Self {
        self.symptoms = Some(symptoms.into());
        self
    }
}

/// 诊断请求：构造后不可变，只能经 adapt 得到
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisRequest {
    description: String,
    crop_type: Option<String>,
    symptoms: Option<String>,
    source: MediaKind,
}

impl DiagnosisRequest {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn crop_type(&self) -> Option<&str> {
        self.crop_type.as_deref()
    }

    pub fn symptoms(&self) -> Option<&str> {
        self.symptoms.as_deref()
    }

    pub fn source(&self) -> MediaKind {
        self.source
    }
}

/// 去首尾空白并把连续空白压成单个空格
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_optional(text: Option<&str>) -> Option<String> {
    text.map(normalize).filter(|s| !s.is_empty())
}

pub fn adapt(capture: &Capture) -> Result<DiagnosisRequest, SessionError> {
    let description = normalize(&capture.description);
    if description.is_empty() {
        return Err(SessionError::MalformedCapture(
            "description is empty after normalization".to_string(),
        ));
    }

    Ok(DiagnosisRequest {
        description,
        crop_type: normalize_optional(capture.crop_type.as_deref()),
        symptoms: normalize_optional(capture.symptoms.as_deref()),
        source: capture.kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapt_image_upload() {
        let req = adapt(&Capture::image_upload()).unwrap();
        assert_eq!(req.description(), IMAGE_UPLOAD_DESCRIPTION);
        assert_eq!(req.crop_type(), Some("Unknown crop from uploaded image"));
        assert_eq!(req.symptoms(), None);
        assert_eq!(req.source(), MediaKind::Image);
    }

    #[test]
    fn test_adapt_collapses_whitespace() {
        let capture = Capture::audio_description()
            .with_description("  yellow   spots\n on\tleaves ")
            .with_symptoms("  wilting ");
        let req = adapt(&capture).unwrap();
        assert_eq!(req.description(), "yellow spots on leaves");
        assert_eq!(req.symptoms(), Some("wilting"));
        assert_eq!(req.source(), MediaKind::Audio);
    }

    #[test]
    fn test_adapt_blank_optionals_become_absent() {
        let capture = Capture::image_upload().with_crop_type("   ").with_symptoms("");
        let req = adapt(&capture).unwrap();
        assert_eq!(req.crop_type(), None);
        assert_eq!(req.symptoms(), None);
    }

    #[test]
    fn test_adapt_rejects_empty_description() {
        let capture = Capture::image_upload().with_description(" \n\t ");
        let err = adapt(&capture).unwrap_err();
        assert!(matches!(err, SessionError::MalformedCapture(_)));
    }
}
