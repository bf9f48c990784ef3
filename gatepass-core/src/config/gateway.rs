use url::Url;

/// Payment gateway credentials and endpoints.
#[derive(Clone)]
pub struct PaymentGatewayConfig {
    pub server_key: Box<[u8]>,
    /// Base URL of the hosted payment page API (transaction creation).
    pub snap_base_url: Url,
    /// Base URL of the core API (transaction status).
    pub api_base_url: Url,
}

impl std::fmt::Debug for PaymentGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGatewayConfig")
            .field("server_key", &"<redacted>")
            .field("snap_base_url", &self.snap_base_url.as_str())
            .field("api_base_url", &self.api_base_url.as_str())
            .finish()
    }
}
