//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CROP_DOCTOR__*` 覆盖（双下划线表示嵌套，如 `CROP_DOCTOR__BACKEND__CHAT_BASE_URL=http://10.0.0.2:8005`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub diagnosis: DiagnosisSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    /// 日志里标识本进程；缺省为包名
    pub name: Option<String>,
}

impl AppSection {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(env!("CARGO_PKG_NAME"))
    }
}

/// [backend] 段：诊断服务与对话服务的地址（两个独立主机）
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_base_url")]
    pub diagnosis_base_url: String,
    #[serde(default = "default_base_url")]
    pub chat_base_url: String,
    #[serde(default)]
    pub timeouts: BackendTimeoutsSection,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8005".to_string()
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            diagnosis_base_url: default_base_url(),
            chat_base_url: default_base_url(),
            timeouts: BackendTimeoutsSection::default(),
        }
    }
}

/// [backend.timeouts] 段（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct BackendTimeoutsSection {
    #[serde(default = "default_connect_timeout")]
    pub connect: u64,
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for BackendTimeoutsSection {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            request: default_request_timeout(),
        }
    }
}

impl BackendTimeoutsSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request)
    }
}

/// [diagnosis] 段：成功响应缺省置信度、降级会话 ID 前缀
#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosisSection {
    /// 后端 2xx 响应未带 confidence 时使用
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
}

fn default_confidence() -> f64 {
    0.85
}

fn default_session_prefix() -> String {
    "session".to_string()
}

impl Default for DiagnosisSection {
    fn default() -> Self {
        Self {
            default_confidence: default_confidence(),
            session_prefix: default_session_prefix(),
        }
    }
}

/// 默认配置文件的查找位置（不含扩展名），按顺序取第一个存在的
const DEFAULT_FILE_CANDIDATES: [&str; 3] = ["config/default", "../config/default", "default"];

fn default_file() -> Option<&'static str> {
    DEFAULT_FILE_CANDIDATES
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{}.toml", name)).exists())
}

impl AppConfig {
    /// 拒绝反序列化成功但无法使用的取值
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: String| Err(config::ConfigError::Message(msg));
        for (key, url) in [
            ("backend.diagnosis_base_url", &self.backend.diagnosis_base_url),
            ("backend.chat_base_url", &self.backend.chat_base_url),
        ] {
            let url = url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return invalid(format!("{} must be an http(s) URL, got {:?}", key, url));
            }
        }
        if self.backend.timeouts.connect == 0 || self.backend.timeouts.request == 0 {
            return invalid("backend.timeouts must be at least 1 second".to_string());
        }
        let confidence = self.diagnosis.default_confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return invalid(format!(
                "diagnosis.default_confidence must be within [0, 1], got {}",
                confidence
            ));
        }
        if self.diagnosis.session_prefix.trim().is_empty() {
            return invalid("diagnosis.session_prefix must not be empty".to_string());
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 CROP_DOCTOR__* 可覆盖
///
/// 源的优先级由低到高：默认文件（见 DEFAULT_FILE_CANDIDATES）、config_path（存在时）、环境变量。
/// 合并后经 [`AppConfig::validate`] 校验，非法取值返回 ConfigError::Message。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(name) = default_file() {
        builder = builder.add_source(config::File::with_name(name).required(false));
    }
    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("CROP_DOCTOR")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

/// 重新从磁盘与环境变量加载配置（调用方决定是否用新配置重建 backend）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_any_source() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.backend.diagnosis_base_url, "http://127.0.0.1:8005");
        assert_eq!(cfg.backend.timeouts.request, 60);
        assert_eq!(cfg.diagnosis.session_prefix, "session");
        assert!((cfg.diagnosis.default_confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(
            &path,
            r#"
[backend]
chat_base_url = "http://10.1.2.3:9000"

[backend.timeouts]
request = 5

[diagnosis]
session_prefix = "fallback"
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.backend.chat_base_url, "http://10.1.2.3:9000");
        assert_eq!(cfg.backend.timeouts.request, 5);
        assert_eq!(cfg.backend.timeouts.connect, 10);
        assert_eq!(cfg.diagnosis.session_prefix, "fallback");
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[diagnosis]\ndefault_confidence = 1.5\n").unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, config::ConfigError::Message(ref m) if m.contains("default_confidence")));
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        assert!(AppConfig::default().validate().is_ok());

        let mut cfg = AppConfig::default();
        cfg.backend.chat_base_url = "   ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.backend.diagnosis_base_url = "127.0.0.1:8005".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.backend.timeouts.request = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.diagnosis.default_confidence = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.diagnosis.session_prefix = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_app_display_name_falls_back_to_package() {
        let mut section = AppSection::default();
        assert_eq!(section.display_name(), "crop-doctor");
        section.name = Some("field-kiosk".to_string());
        assert_eq!(section.display_name(), "field-kiosk");
    }

    #[test]
    fn test_missing_explicit_file_is_ignored() {
        let cfg = load_config(Some(PathBuf::from("/nonexistent/crop-doctor.toml"))).unwrap();
        assert!(!cfg.backend.diagnosis_base_url.is_empty());
    }
}
