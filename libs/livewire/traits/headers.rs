use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers to send with the realtime handshake
pub type Headers = HashMap<String, String>;

/// Trait for providing handshake headers dynamically
///
/// Called on every connection attempt, including reconnections, so
/// short-lived tokens can be refreshed between attempts.
///
/// # Example
/// ```ignore
/// struct SessionHeaders {
///     session: Arc<RwLock<String>>,
/// }
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for SessionHeaders {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = HashMap::new();
///         headers.insert("Authorization".to_string(), format!("Bearer {}", self.session.read()));
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers to send with the handshake request
    async fn get_headers(&self) -> Headers;
}

/// Static API key headers for a backend-as-a-service realtime endpoint
///
/// Sends the key both as `apikey` and as a bearer token.
#[derive(Debug, Clone)]
pub struct ApiKeyHeaders {
    api_key: String,
}

impl ApiKeyHeaders {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl HeaderProvider for ApiKeyHeaders {
    async fn get_headers(&self) -> Headers {
        let mut headers = HashMap::new();
        headers.insert("apikey".to_string(), self.api_key.clone());
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers
    }
}
