use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 设备标识（登录用户 + 主机）
///
/// 连接池以此为键，同一个键最多只有一个已登录的设备连接。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey {
    pub principal: String,
    pub host: String,
}

impl DeviceKey {
    pub fn new(principal: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.principal, self.host)
    }
}

/// 登录凭据
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// 密码不进日志
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// NVR上报的摄像头
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "videoCodec", skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
}

impl CameraInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            video_codec: None,
        }
    }
}

/// 流元数据，会话启动后填充
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub codec: String,
    pub container: String,
    pub endpoint: String,
}

/// 流会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Started,
    Stopped,
    Disposed,
}

/// 已启动流的汇报信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamReport {
    pub id: String,
    pub codec: String,
    pub container: String,
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
}

impl StreamReport {
    pub fn new(id: impl Into<String>, metadata: StreamMetadata) -> Self {
        Self {
            id: id.into(),
            codec: metadata.codec,
            container: metadata.container,
            endpoint: metadata.endpoint,
            started_at: Utc::now(),
        }
    }
}

impl fmt::Display for StreamReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Started stream '{}', codec is '{}', container is '{}' endpoint is '{}'",
            self.id, self.codec, self.container, self.endpoint
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_display() {
        let key = DeviceKey::new("viewer", "nvr1");
        assert_eq!(key.to_string(), "viewer:nvr1");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("viewer", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("viewer"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_camera_info_from_bootstrap_json() {
        let camera: CameraInfo =
            serde_json::from_str(r#"{"id":"667b","name":"front","videoCodec":"h264","mac":"x"}"#)
                .unwrap();
        assert_eq!(camera.name, "front");
        assert_eq!(camera.video_codec.as_deref(), Some("h264"));
    }
}
