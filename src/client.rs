use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client as ReqwestClient, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::attachment::Attachment;
use crate::chat::CoastieConfig;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_RAW_REPLY_FALLBACKS, CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};

/// The hosted Coastie chat function.
pub const DEFAULT_ENDPOINT: &str =
    "https://adaskids-preview.netlify.app/.netlify/functions/coastie-chat";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Multipart field carrying the prompt text.
pub const MESSAGE_FIELD: &str = "message";
/// Multipart field carrying the attached file.
pub const FILE_FIELD: &str = "file";

/// What to do with a success response that has no `reply` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyFallback {
    /// Fail the exchange with [`Error::MalformedReply`].
    #[default]
    Reject,
    /// Treat the whole body as the reply text.
    RawBody,
}

/// The outcome of looking for a reply in a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedReply {
    /// The body was a JSON object with a string `reply`.
    Field(String),
    /// No reply was found; holds the original body unchanged.
    Raw(String),
}

impl ExtractedReply {
    /// Returns the reply text, or the raw body when no reply was found.
    pub fn into_text(self) -> String {
        match self {
            ExtractedReply::Field(text) | ExtractedReply::Raw(text) => text,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    reply: String,
}

/// Encode the JSON request body `{"message": ...}`.
pub fn encode_message(message: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(&ChatRequest { message }).map_err(|e| {
        Error::serialization(
            format!("Failed to encode request: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Find the assistant's answer in a response body.
pub fn extract_reply(body: &str) -> ExtractedReply {
    match serde_json::from_str::<ChatReply>(body) {
        Ok(parsed) => ExtractedReply::Field(parsed.reply),
        Err(_) => ExtractedReply::Raw(body.to_string()),
    }
}

/// Backend the chat session talks to.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a text-only prompt.
    async fn send_json(&self, message: &str) -> Result<String>;

    /// Send a prompt together with a file.
    async fn send_multipart(&self, message: &str, attachment: &Attachment) -> Result<String>;
}

/// Client for the Coastie chat endpoint.
///
/// Every call is a single POST with no retry; callers decide whether to try
/// again.
#[derive(Debug, Clone)]
pub struct Coastie {
    client: ReqwestClient,
    endpoint: Url,
    json_timeout: Duration,
    multipart_timeout: Duration,
    reply_fallback: ReplyFallback,
}

impl Coastie {
    /// Create a new client from configuration.
    pub fn new(config: &CoastieConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::url(
                format!("unsupported endpoint scheme: {}", endpoint.scheme()),
                None,
            ));
        }

        let client = ReqwestClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint,
            json_timeout: config.read_timeout + config.write_timeout,
            multipart_timeout: config.read_timeout + config.upload_write_timeout,
            reply_fallback: config.reply_fallback,
        })
    }

    /// Create a client for the default endpoint with default timeouts.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Self::new(&CoastieConfig::new().with_endpoint(endpoint))
    }

    /// The endpoint every request is posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Post `{"message": ...}` and return the reply.
    pub async fn send_json(&self, message: &str) -> Result<String> {
        let body = encode_message(message)?;
        let request = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
            .timeout(self.json_timeout)
            .body(body);
        self.execute(request, self.json_timeout).await
    }

    /// Post a multipart form with `message` and `file` parts and return the reply.
    ///
    /// The file is streamed from its source while the request is written.
    pub async fn send_multipart(&self, message: &str, attachment: &Attachment) -> Result<String> {
        let meta = attachment.meta();
        let reader = attachment.open().await?;
        let body = Body::wrap_stream(ReaderStream::new(reader));
        // A known length lets reqwest send Content-Length instead of chunking.
        let part = match meta.size_bytes {
            Some(length) => Part::stream_with_length(body, length),
            None => Part::stream(body),
        };
        let part = part
            .file_name(meta.name.clone())
            .mime_str(&meta.mime_type)
            .map_err(|e| {
                Error::validation(
                    format!("Invalid MIME type {:?}: {}", meta.mime_type, e),
                    Some("mime_type".to_string()),
                )
            })?;
        let form = Form::new()
            .text(MESSAGE_FIELD, message.to_string())
            .part(FILE_FIELD, part);

        let request = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .timeout(self.multipart_timeout)
            .multipart(form);
        self.execute(request, self.multipart_timeout).await
    }

    async fn execute(&self, request: RequestBuilder, timeout: Duration) -> Result<String> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.execute_inner(request, timeout).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if let Err(err) = &result {
            CLIENT_REQUEST_ERRORS.click();
            tracing::debug!(endpoint = %self.endpoint, error = %err, "chat request failed");
        }
        result
    }

    async fn execute_inner(&self, request: RequestBuilder, timeout: Duration) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        let body = read_body(response, timeout).await?;

        if !status.is_success() {
            return Err(Error::api(status.as_u16(), body));
        }

        match extract_reply(&body) {
            ExtractedReply::Field(reply) => Ok(reply),
            ExtractedReply::Raw(body) => match self.reply_fallback {
                ReplyFallback::Reject => Err(Error::malformed_reply(body)),
                ReplyFallback::RawBody => {
                    CLIENT_RAW_REPLY_FALLBACKS.click();
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        "response had no reply field; using the raw body"
                    );
                    Ok(body)
                }
            },
        }
    }
}

#[async_trait::async_trait]
impl ChatBackend for Coastie {
    async fn send_json(&self, message: &str) -> Result<String> {
        Coastie::send_json(self, message).await
    }

    async fn send_multipart(&self, message: &str, attachment: &Attachment) -> Result<String> {
        Coastie::send_multipart(self, message, attachment).await
    }
}

async fn read_body(response: Response, timeout: Duration) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout))
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::timeout(
            format!("Request timed out: {}", e),
            Some(timeout.as_secs_f64()),
        )
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
    }
}
