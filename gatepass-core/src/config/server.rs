use std::net::SocketAddr;
use std::time::Duration;
use time::UtcOffset;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Per-request deadline applied to every route.
    pub request_timeout: Duration,
    /// Trust the first `X-Forwarded-For` hop as the client address.
    pub trust_forwarded_for: bool,
    /// Offset of the venue's local time, used for per-day gate capacity.
    pub venue_utc_offset: UtcOffset,
}
