/// Admin authentication configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Argon2 PHC string of the admin secret.
    pub secret_hash: String,
}
