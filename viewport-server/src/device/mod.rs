pub mod api;
pub mod nvr;
pub mod pool;
pub mod protect;

#[cfg(test)]
pub mod mock;

pub use api::{FeedEvent, LiveFeed, ProtectApi, ProtectConnector, UpstreamError};
pub use nvr::NvrConnection;
pub use pool::ConnectionPool;
pub use protect::HttpProtectConnector;
