use thiserror::Error;

/// 流调度错误
///
/// 实现了`Clone`，同一设备的单次登录失败可以同时返回给所有等待者。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid stream url: {0}")]
    InvalidRequestUrl(String),

    #[error("No provider can handle url: {0}")]
    NoProviderFound(String),

    #[error("Authentication failed for NVR at '{host}': {reason}")]
    AuthenticationFailed { host: String, reason: String },

    #[error("Unable to bootstrap NVR at '{host}': {reason}")]
    BootstrapFailed { host: String, reason: String },

    #[error("Camera '{camera}' not found in NVR at '{host}'")]
    CameraNotFound { camera: String, host: String },

    #[error("Unknown stream id: {0}")]
    UnknownTopic(String),

    #[error("Live feed error: {0}")]
    LiveFeed(String),

    #[error("Stream '{0}' has been disposed")]
    SessionDisposed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for DispatchError {
    fn from(error: std::io::Error) -> Self {
        DispatchError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(error: serde_json::Error) -> Self {
        DispatchError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_not_found_mentions_name_and_host() {
        let error = DispatchError::CameraNotFound {
            camera: "garage".to_string(),
            host: "nvr1".to_string(),
        };

        let message = error.to_string();
        assert!(message.contains("garage"));
        assert!(message.contains("nvr1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let error: DispatchError = io.into();
        assert!(matches!(error, DispatchError::Io(ref msg) if msg.contains("port taken")));
    }
}
