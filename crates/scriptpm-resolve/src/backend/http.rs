//! HTTP transport for remote feeds
//!
//! The client is configured once (timeouts, user agent, static headers) when
//! the transport is built. Anything request-specific travels in
//! [`RequestOptions`] instead of mutating shared client state.

use super::BackendError;
use crate::cancel::CancellationToken;
use crate::config::HttpConfig;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use std::io::Read;
use url::Url;

/// Per-request settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Accept header for this request
    pub accept: Option<String>,

    /// Additional headers for this request only
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn accept(mime: &str) -> Self {
        Self {
            accept: Some(mime.to_string()),
            headers: Vec::new(),
        }
    }
}

/// Blocking GET of a text body
pub trait HttpTransport {
    fn get(
        &self,
        url: &Url,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<String, BackendError>;
}

/// [`HttpTransport`] backed by a reqwest blocking client
pub struct ReqwestTransport {
    client: Client,
    max_size: u64,
}

impl ReqwestTransport {
    /// Build the client from config
    pub fn new(config: &HttpConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                BackendError::InvalidHeader(format!("invalid header name {}: {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                BackendError::InvalidHeader(format!("invalid header value for {}: {}", name, e))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|source| BackendError::Transport {
                url: String::new(),
                source,
            })?;

        Ok(Self {
            client,
            max_size: config.max_response_bytes,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(
        &self,
        url: &Url,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<String, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        tracing::debug!(%url, "GET");

        let mut request = self.client.get(url.clone());
        if let Some(ref accept) = options.accept {
            request = request.header(ACCEPT, accept.as_str());
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let transport_error = |source| BackendError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len > self.max_size {
                return Err(BackendError::ContentTooLarge {
                    url: url.to_string(),
                    max: self.max_size,
                });
            }
        }

        // content-length is not always sent
        read_capped(response, self.max_size, url)
    }
}

/// Read a response body as UTF-8, failing once it exceeds `max_size` bytes
fn read_capped(body: impl Read, max_size: u64, url: &Url) -> Result<String, BackendError> {
    let mut content = Vec::new();
    let mut reader = body.take(max_size.saturating_add(1));
    reader.read_to_end(&mut content).map_err(|e| BackendError::MalformedResponse {
        url: url.to_string(),
        reason: format!("failed to read body: {}", e),
    })?;

    if content.len() as u64 > max_size {
        return Err(BackendError::ContentTooLarge {
            url: url.to_string(),
            max: max_size,
        });
    }

    String::from_utf8(content)
        .map_err(|_| BackendError::malformed(url.as_str(), "response body is not valid UTF-8"))
}

/// Parse a repository URL, rejecting anything that is not http(s)
pub(crate) fn parse_http_url(raw: &str) -> Result<Url, BackendError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BackendError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            raw, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://www.powershellgallery.com/api/v2").is_ok());
        assert!(matches!(
            parse_http_url("ftp://example.com/feed"),
            Err(BackendError::InvalidUrl(_))
        ));
        assert!(parse_http_url("not a url").is_err());
    }

    #[test]
    fn test_cancelled_before_request() {
        let transport = ReqwestTransport::new(&HttpConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let url = Url::parse("http://127.0.0.1:9/never").unwrap();
        let result = transport.get(&url, &RequestOptions::default(), &cancel);
        assert!(matches!(result, Err(BackendError::Cancelled)));
    }

    #[test]
    fn test_read_capped() {
        let url = Url::parse("https://feed.test/index.json").unwrap();

        assert_eq!(read_capped(&b"{}"[..], 2, &url).unwrap(), "{}");
        assert_eq!(read_capped(&b"{}"[..], u64::MAX, &url).unwrap(), "{}");
        assert!(matches!(
            read_capped(&b"{ }"[..], 2, &url),
            Err(BackendError::ContentTooLarge { max: 2, .. })
        ));
        assert!(matches!(
            read_capped(&[0xffu8, 0xfe][..], 16, &url),
            Err(BackendError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_header_config() {
        let mut config = HttpConfig::default();
        config.headers.insert("bad header".to_string(), "x".to_string());
        assert!(ReqwestTransport::new(&config).is_err());
    }
}
