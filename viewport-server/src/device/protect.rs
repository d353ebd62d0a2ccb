// UniFi Protect 风格控制器的HTTP/WebSocket客户端
//
// - 登录: POST /api/auth/login，保存TOKEN cookie和CSRF令牌
// - 清单: GET /proxy/protect/api/bootstrap
// - 实时流: GET /proxy/protect/api/ws/livestream 取得WebSocket地址后连接，
//   每条二进制消息作为一帧转发

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{CameraInfo, Credentials};
use futures::{SinkExt, StreamExt};
use reqwest::header::{COOKIE, SET_COOKIE};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{FeedEvent, LiveFeed, ProtectApi, ProtectConnector, UpstreamError};
use crate::config::UpstreamConfig;

const CSRF_HEADER: &str = "x-csrf-token";
const SESSION_COOKIE: &str = "TOKEN=";
const FEED_BUFFER: usize = 256;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    remember_me: bool,
}

#[derive(Deserialize)]
struct BootstrapResponse {
    #[serde(default)]
    cameras: Vec<CameraInfo>,
}

#[derive(Deserialize)]
struct WsEndpoint {
    url: String,
}

#[derive(Deserialize)]
struct CodecMessage {
    codec: String,
}

/// 基于HTTP的登录器
pub struct HttpProtectConnector {
    verify_tls: bool,
}

impl HttpProtectConnector {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            verify_tls: config.verify_tls,
        }
    }
}

#[async_trait]
impl ProtectConnector for HttpProtectConnector {
    async fn login(
        &self,
        host: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn ProtectApi>, UpstreamError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        info!(
            "Connecting to NVR at '{}' with username '{}'...",
            host, credentials.username
        );

        let response = client
            .post(format!("https://{}/api/auth/login", host))
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
                remember_me: true,
            })
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Rejected(format!(
                "Invalid login credentials (status {})",
                response.status()
            )));
        }

        let csrf_token = response
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let session_cookie = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|value| value.starts_with(SESSION_COOKIE))
            .map(str::to_string)
            .ok_or_else(|| {
                UpstreamError::Protocol("Login response carried no session token".to_string())
            })?;

        Ok(Arc::new(HttpProtectApi {
            host: host.to_string(),
            client,
            session_cookie,
            csrf_token,
            verify_tls: self.verify_tls,
        }))
    }
}

/// 已登录的控制器会话
pub struct HttpProtectApi {
    host: String,
    client: reqwest::Client,
    session_cookie: String,
    csrf_token: Option<String>,
    verify_tls: bool,
}

impl HttpProtectApi {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("https://{}{}", self.host, path))
            .header(COOKIE, &self.session_cookie);
        if let Some(ref token) = self.csrf_token {
            builder = builder.header(CSRF_HEADER, token);
        }
        builder
    }

    async fn livestream_endpoint(&self, camera_id: &str, channel: u8) -> Result<String, UpstreamError> {
        let channel = channel.to_string();
        let response = self
            .request(reqwest::Method::GET, "/proxy/protect/api/ws/livestream")
            .query(&[
                ("camera", camera_id),
                ("channel", channel.as_str()),
                ("extendedVideoMetadata", "true"),
                ("fragmentDurationMillis", "100"),
                ("progressive", "true"),
                ("type", "fmp4"),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Rejected(format!(
                "Livestream endpoint returned status {}",
                response.status()
            )));
        }

        let endpoint: WsEndpoint = response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        Ok(endpoint.url)
    }
}

#[async_trait]
impl ProtectApi for HttpProtectApi {
    async fn bootstrap(&self) -> Result<Vec<CameraInfo>, UpstreamError> {
        let response = self
            .request(reqwest::Method::GET, "/proxy/protect/api/bootstrap")
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Rejected(format!(
                "Bootstrap returned status {}",
                response.status()
            )));
        }

        let bootstrap: BootstrapResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        debug!(
            "Bootstrap of '{}' reported {} cameras",
            self.host,
            bootstrap.cameras.len()
        );
        Ok(bootstrap.cameras)
    }

    async fn open_livestream(
        &self,
        camera_id: &str,
        channel: u8,
    ) -> Result<LiveFeed, UpstreamError> {
        let url = self.livestream_endpoint(camera_id, channel).await?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        let cookie = HeaderValue::from_str(&self.session_cookie)
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;
        request.headers_mut().insert("Cookie", cookie);

        let (stream, response) = connect_async_tls_with_config(
            request,
            None,
            false,
            Some(tls_connector(self.verify_tls)),
        )
        .await
        .map_err(|e| UpstreamError::WebSocket(e.to_string()))?;

        debug!(
            "Livestream socket for camera {} connected: {:?}",
            camera_id,
            response.status()
        );

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let cancel = CancellationToken::new();
        tokio::spawn(read_livestream(
            stream,
            tx,
            cancel.clone(),
            camera_id.to_string(),
        ));

        Ok(LiveFeed::new(rx, cancel))
    }

    async fn logout(&self) {
        if let Err(e) = self
            .request(reqwest::Method::POST, "/api/auth/logout")
            .send()
            .await
        {
            debug!("Logout from '{}' failed: {}", self.host, e);
        }
    }
}

async fn read_livestream(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    camera_id: String,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = stream.close(None).await;
                break;
            }
            message = stream.next() => {
                let event = match message {
                    Some(Ok(Message::Binary(data))) => FeedEvent::Frame(Bytes::from(data)),
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<CodecMessage>(&text) {
                            Ok(message) => FeedEvent::Codec(message.codec),
                            Err(_) => continue,
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = stream.send(Message::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Livestream for camera {} closed by controller: {:?}", camera_id, frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Livestream for camera {} failed: {}", camera_id, e);
                        break;
                    }
                    None => break,
                };

                if tx.send(event).await.is_err() {
                    // 接收端已丢弃
                    let _ = stream.close(None).await;
                    break;
                }
            }
        }
    }
}

fn tls_connector(verify_tls: bool) -> Connector {
    let provider = rustls::crypto::ring::default_provider();
    let _ = provider.clone().install_default();

    let config = if verify_tls {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(Arc::new(provider))))
            .with_no_client_auth()
    };

    Connector::Rustls(Arc::new(config))
}

/// 跳过证书链校验，仍然校验握手签名
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<rustls::crypto::CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
