pub mod config;
pub mod device;
pub mod dispatcher;
pub mod provider;
pub mod relay;
pub mod request;
pub mod serde_helpers;
pub mod session;

pub use config::{AppConfig, ConfigManager, EnvConfigOverride};
pub use dispatcher::Dispatcher;
pub use provider::{ProviderRegistry, RtspStreamProvider, StreamProvider, UnifiStreamProvider};
pub use relay::{IdlePolicy, Relay, RelayServer};
pub use request::{CameraSelector, StreamRequest};
pub use session::StreamSession;
