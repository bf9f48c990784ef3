//! Header names used across the Gatepass HTTP surface.

/// Client-supplied idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Idempotency token header accepted on order creation.
pub const ORDER_IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";

/// Set to `true` on responses served from the idempotency cache.
pub const IDEMPOTENT_REPLAY_HEADER: &str = "X-Idempotent-Replay";

/// Bucket capacity of the limiter that admitted (or denied) the request.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "X-RateLimit-Limit";

/// Whole tokens left in the bucket after this request.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "X-RateLimit-Remaining";

/// Unix seconds at which the bucket will admit another request.
pub const RATE_LIMIT_RESET_HEADER: &str = "X-RateLimit-Reset";

/// Authenticated user id, forwarded by the authenticating proxy.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Role of the authenticated user (`admin`, `staff` or `guest`).
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// Admin secret for administrative endpoints.
pub const ADMIN_AUTH_HEADER: &str = "Gatepass-Admin-Authorization";

/// Client address as seen by a trusted reverse proxy.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
