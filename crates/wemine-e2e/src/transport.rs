// HTTP transport routed through the session's NetworkController
//
// API-only tests and the in-process application both send HTTP through this
// type so that offline toggles, rules, recordings and waits apply to them
// exactly as they apply to browser traffic.

use crate::error::{Error, Result};
use crate::network::{Interception, NetworkController, RequestInfo};
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response returned by [`HttpTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    /// Response headers in arrival order (empty for fulfilled rules)
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fails with [`Error::UnexpectedStatus`] unless the status is in `expected`.
    pub fn expect_status(self, expected: &[u16]) -> Result<Self> {
        if expected.contains(&self.status) {
            return Ok(self);
        }
        Err(Error::UnexpectedStatus {
            url: self.url,
            expected: expected.to_vec(),
            actual: self.status,
        })
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    /// Extra headers sent as is
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Raw body; the content type comes from [`header`](Self::header).
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `payload` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(payload)?));
        Ok(self.header(reqwest::header::CONTENT_TYPE.as_str(), "application/json"))
    }
}

/// reqwest client bound to a session's network conditions.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    network: NetworkController,
}

impl HttpTransport {
    pub fn new(network: NetworkController) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, network })
    }

    pub fn network(&self) -> &NetworkController {
        &self.network
    }

    /// Sends a request.
    ///
    /// Emits a request event, applies the network conditions, and emits the
    /// outcome. Transport-level failures (offline, abort rules, connection
    /// errors) are returned as errors; every HTTP status is returned as a
    /// response and left to the caller to judge.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let info = RequestInfo::new(request.method.as_str(), request.url.as_str());
        self.network.emit_request(&info);

        match self.network.intercept(&info).await {
            Interception::Abort(error_code) => {
                self.network.emit_failed(&info, error_code.as_str());
                Err(Error::TransportAbort {
                    url: request.url,
                    error_code,
                })
            }
            Interception::Fulfill(mock) => {
                tracing::debug!(url = %request.url, status = mock.status, "Fulfilled from rule");
                self.network
                    .emit_response(&info, Some(mock.status), mock.body.clone());
                Ok(HttpResponse {
                    url: request.url,
                    status: mock.status,
                    headers: Vec::new(),
                    body: mock.body,
                })
            }
            Interception::Continue => {
                let result = self.forward(&request).await;
                match result {
                    Ok(response) => {
                        self.network.emit_response(
                            &info,
                            Some(response.status),
                            response.body.clone(),
                        );
                        Ok(response)
                    }
                    Err(err) => {
                        tracing::debug!(url = %request.url, error = %err, "Request failed");
                        self.network.emit_failed(&info, "failed");
                        Err(err)
                    }
                }
            }
        }
    }

    /// Sends `request` straight to the backend.
    ///
    /// No events are emitted and no network conditions apply; callers that
    /// already ran [`NetworkController::intercept`] for this request use it to
    /// reach the real server.
    pub async fn forward(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;
        Ok(HttpResponse {
            url: request.url.clone(),
            status,
            headers,
            body,
        })
    }

    /// GET returning the raw response.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::get(url)).await
    }

    /// POST a JSON body returning the raw response.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<HttpResponse> {
        self.send(HttpRequest::post(url).json(payload)?).await
    }
}
