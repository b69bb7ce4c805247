//! The seam between the chat client and the network.
//!
//! [`Transport`] performs one request against the Messages endpoint.  [`HttpTransport`] is the
//! production implementation over `reqwest`; tests substitute scripted transports.

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use url::Url;

use crate::config::ApiKey;
use crate::error::{Error, Result};
use crate::sse::process_sse;
use crate::types::{ErrorResponse, Message, MessageCreateParams, MessageStreamEvent};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<MessageStreamEvent>> + Send>>;

/// Performs requests against the Messages endpoint.
///
/// Implementations hold no per-conversation state; every call is an independent request.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and waits for the complete message.
    async fn create(&self, api_key: &ApiKey, params: MessageCreateParams) -> Result<Message>;

    /// Sends a streaming request and returns the event stream once the response headers
    /// arrive.  Errors before that point are returned directly; errors afterwards arrive as
    /// items of the stream.
    async fn stream(&self, api_key: &ApiKey, params: MessageCreateParams) -> Result<EventStream>;
}

/// Transport over HTTPS using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    messages_url: Url,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the public API with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a transport with a custom base URL and/or timeout.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let messages_url = Url::parse(&base_url)?.join("messages")?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            messages_url,
            timeout,
        })
    }

    /// The endpoint requests are posted to.
    pub fn messages_url(&self) -> &Url {
        &self.messages_url
    }

    /// Create and return default headers for API requests.
    fn default_headers(api_key: &ApiKey) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(api_key.expose()).map_err(|_| {
            Error::configuration(
                "API key contains characters not allowed in a header",
                Some("api_key".to_string()),
            )
        })?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_API_VERSION),
        );
        Ok(headers)
    }

    async fn post(&self, headers: HeaderMap, params: &MessageCreateParams) -> Result<Response> {
        let response = self
            .client
            .post(self.messages_url.clone())
            .headers(headers)
            .json(params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }
        Ok(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn create(&self, api_key: &ApiKey, mut params: MessageCreateParams) -> Result<Message> {
        params.stream = false;
        let response = self.post(Self::default_headers(api_key)?, &params).await?;
        response.json::<Message>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })
    }

    async fn stream(&self, api_key: &ApiKey, mut params: MessageCreateParams) -> Result<EventStream> {
        params.stream = true;
        let mut headers = Self::default_headers(api_key)?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let response = self.post(headers, &params).await?;
        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}

/// Converts a non-success response into an [`Error`].
async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();

    let request_id = response
        .headers()
        .get("request-id")
        .or_else(|| response.headers().get("x-request-id"))
        .and_then(|val| val.to_str().ok())
        .map(String::from);

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => Error::from_provider(
            status_code,
            Some(&parsed.error.error_type),
            parsed.error.message,
            request_id,
            retry_after,
        ),
        Err(_) => Error::from_provider(status_code, None, body, request_id, retry_after),
    }
}
