//! API server configuration.

/// Configuration for the HTTP layer.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// Browser origin allowed to call the API with credentials. Any origin,
    /// without credentials, when unset.
    pub cors_origin: Option<String>,
    /// Mark the `JWT` cookie `Secure`.
    pub secure_cookies: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            cors_origin: None,
            secure_cookies: false,
        }
    }
}
