use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MirrorConfig;
use crate::domain::EntityKind;
use crate::error::MirrorError;

/// Network boundary of the mirror. Every remote read goes through here, so
/// tests can count calls by swapping in a recording implementation.
pub trait MgnifyClient: Send + Sync {
    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, MirrorError>;
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError>;
}

/// Collection URLs advertised by the API root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub studies: String,
    pub samples: String,
}

impl Endpoints {
    pub fn for_kind(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Sample => &self.samples,
            EntityKind::Study => &self.studies,
        }
    }
}

pub fn discover_endpoints<C: MgnifyClient + ?Sized>(
    client: &C,
    api_url: &str,
) -> Result<Endpoints, MirrorError> {
    let root = client.get_json(api_url, &[])?;
    let data = root
        .get("data")
        .ok_or_else(|| MirrorError::missing("API root", "data"))?;
    let endpoint = |name: &str| {
        data.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MirrorError::MissingEndpoint(name.to_string()))
    };
    Ok(Endpoints {
        studies: endpoint(EntityKind::Study.endpoint_name())?,
        samples: endpoint(EntityKind::Sample.endpoint_name())?,
    })
}

#[derive(Clone)]
pub struct MgnifyHttpClient {
    client: Client,
    max_retries: usize,
}

impl MgnifyHttpClient {
    pub fn new(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mgnify-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| MirrorError::Http(err.to_string()))?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    fn handle_status(url: &str, response: Response) -> Result<Response, MirrorError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "MGnify request failed".to_string());
        Err(MirrorError::Status {
            status,
            url: url.to_string(),
            message,
        })
    }

    fn send_with_retries<F>(&self, url: &str, mut make_req: F) -> Result<Response, MirrorError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        attempt += 1;
                        warn!(url, status, attempt, "retrying MGnify request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Self::handle_status(url, resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        attempt += 1;
                        warn!(url, attempt, error = %err, "retrying MGnify request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64));
                        continue;
                    }
                    return Err(MirrorError::Http(err.to_string()));
                }
            }
        }
    }
}

impl MgnifyClient for MgnifyHttpClient {
    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, MirrorError> {
        debug!(url, "GET");
        let response = self.send_with_retries(url, || self.client.get(url).query(query))?;
        response.json().map_err(|err| MirrorError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, MirrorError> {
        debug!(url, "GET (bytes)");
        let response = self.send_with_retries(url, || self.client.get(url))?;
        let bytes = response
            .bytes()
            .map_err(|err| MirrorError::Http(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
