// 请求URL解析
//
// 请求格式: scheme://[user[:password]@]host/camera/<selector>
// selector 为通配符 `_all` 或逗号分隔的摄像头名称列表。

use std::borrow::Cow;
use std::fmt;

use common::{Credentials, DeviceKey, DispatchError, Result};
use url::Url;

/// 代表"全部摄像头"的通配符
pub const WILDCARD: &str = "_all";

/// 摄像头流请求的路径前缀
pub const CAMERA_PATH_PREFIX: &str = "camera";

/// 已解析的流请求
#[derive(Clone)]
pub struct StreamRequest {
    url: Url,
}

impl StreamRequest {
    /// 解析请求URL，任何网络操作之前完成
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input.trim()).map_err(|e| {
            DispatchError::InvalidRequestUrl(format!("Failed to process stream url, got '{}'", e))
        })?;

        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(Self { url }),
            _ => Err(DispatchError::InvalidRequestUrl(format!(
                "Stream url '{}' has no host",
                redact(&url)
            ))),
        }
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// 主机（含非默认端口）
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            decode(self.url.username()),
            decode(self.url.password().unwrap_or_default()),
        )
    }

    pub fn device_key(&self) -> DeviceKey {
        DeviceKey::new(decode(self.url.username()), self.host())
    }

    /// URL解码后的路径段
    pub fn path_segments(&self) -> Vec<String> {
        self.url
            .path_segments()
            .map(|segments| segments.map(decode).collect())
            .unwrap_or_default()
    }

    /// 第一个路径段是否等于给定前缀
    pub fn has_path_prefix(&self, prefix: &str) -> bool {
        self.path_segments()
            .first()
            .map(|segment| segment == prefix)
            .unwrap_or(false)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact(&self.url))
    }
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamRequest").field(&redact(&self.url)).finish()
    }
}

/// 摄像头选择器
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSelector {
    /// 设备当前上报的全部摄像头
    All,
    /// 按名称指定，保持请求顺序
    Named(Vec<String>),
}

impl CameraSelector {
    /// 从 `/camera/<selector>` 路径中取出选择器
    pub fn from_request(request: &StreamRequest) -> Result<Self> {
        let segments = request.path_segments();
        if segments.first().map(String::as_str) != Some(CAMERA_PATH_PREFIX) {
            return Err(DispatchError::InvalidRequestUrl(format!(
                "Expecting url path to start with '/{}' but got '{}'",
                CAMERA_PATH_PREFIX,
                request.url().path()
            )));
        }

        Self::parse(segments.get(1).map(String::as_str).unwrap_or_default())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DispatchError::InvalidRequestUrl(format!(
                "Expecting url path to specify either '/camera/{}' or '/camera/camera1,camera2...' but got '{}'",
                WILDCARD, raw
            )));
        }

        if raw == WILDCARD {
            return Ok(CameraSelector::All);
        }

        let names: Vec<String> = raw.split(',').map(|name| name.trim().to_string()).collect();
        if names.iter().any(String::is_empty) {
            return Err(DispatchError::InvalidRequestUrl(format!(
                "Camera list '{}' contains an empty name",
                raw
            )));
        }

        Ok(CameraSelector::Named(names))
    }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| value.to_string())
}

fn redact(url: &Url) -> String {
    if url.password().is_none() {
        return url.to_string();
    }

    let mut redacted = url.clone();
    // 非特殊scheme同样允许设置密码
    let _ = redacted.set_password(Some("***"));
    redacted.to_string()
}
