// Chromium-backed surface
//
// Every request the page makes goes through one `**/*` route handler that
// asks the session's NetworkController what to do with it, so browser traffic
// obeys the same offline flag and rules as the HTTP transport. Requests the
// rules let through are sent by the session's HttpTransport and the route is
// fulfilled with the real response, so waits see real statuses and bodies.

use crate::error::{Error, Result};
use crate::network::rule::DEFAULT_ABORT_CODE;
use crate::network::{Interception, NetworkController, RequestInfo};
use crate::surface::{
    ControlSnapshot, Cookie, Launcher, OriginState, StorageItem, StorageState, Surface,
    SurfaceContext,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use base64::Engine;
use playwright_rs::protocol::{BrowserContext, FulfillOptions, Route};
use playwright_rs::server::channel_owner::ChannelOwner;
use playwright_rs::{Browser, Locator, Page, Playwright};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Browser request headers not copied onto the forwarded request
const SKIPPED_REQUEST_HEADERS: [&str; 4] = ["host", "content-length", "connection", "accept-encoding"];

/// Backend response headers not copied onto the fulfilled route
const SKIPPED_RESPONSE_HEADERS: [&str; 4] =
    ["content-length", "content-encoding", "transfer-encoding", "connection"];

const CONTROLS_SCRIPT: &str = r#"(scope) => {
    const root = scope ? document.querySelector(scope) : document;
    if (!root) return [];
    return Array.from(root.querySelectorAll('input, select, textarea')).map((el) => {
        const label = el.id ? document.querySelector(`label[for="${el.id}"]`) : el.closest('label');
        return {
            tag: el.tagName.toLowerCase(),
            inputType: el.tagName === 'INPUT' ? (el.getAttribute('type') || 'text') : null,
            name: el.getAttribute('name'),
            id: el.id || null,
            testId: el.getAttribute('data-testid'),
            value: el.value ?? '',
            checked: !!el.checked,
            required: el.required || el.getAttribute('aria-required') === 'true',
            label: label ? label.textContent.trim() : null,
        };
    });
}"#;

const SESSION_STORAGE_SCRIPT: &str = r#"() => Object.keys(sessionStorage).map((name) => ({ name, value: sessionStorage.getItem(name) }))"#;

const CLEAR_STORAGE_SCRIPT: &str = r#"() => {
    localStorage.clear();
    sessionStorage.clear();
    for (const cookie of document.cookie.split(';')) {
        const name = cookie.split('=')[0].trim();
        if (name) document.cookie = `${name}=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/`;
    }
    return null;
}"#;

/// Launches one Chromium and opens a fresh context per session.
pub struct PlaywrightLauncher {
    _playwright: Playwright,
    browser: Browser,
}

impl PlaywrightLauncher {
    /// Starts the Playwright server and a headless Chromium.
    pub async fn launch() -> Result<Self> {
        let playwright = Playwright::launch().await?;
        let browser = playwright.chromium().launch().await?;
        tracing::info!(version = browser.version(), "Chromium launched");
        Ok(Self {
            _playwright: playwright,
            browser,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.browser.close().await.map_err(Error::from)
    }
}

#[async_trait]
impl Launcher for PlaywrightLauncher {
    async fn open(&self, context: SurfaceContext) -> Result<Arc<dyn Surface>> {
        let browser_context = self.browser.new_context().await?;
        let page = browser_context.new_page().await?;

        let network = context.network.clone();
        let http = context.http.clone();
        page.route("**/*", move |route| {
            let network = network.clone();
            let http = http.clone();
            async move { bridge(&network, &http, route).await }
        })
        .await?;

        Ok(Arc::new(PlaywrightSurface {
            page,
            context: browser_context,
        }))
    }
}

async fn bridge(
    network: &NetworkController,
    http: &HttpTransport,
    route: Route,
) -> playwright_rs::Result<()> {
    let request = route.request();
    let info = RequestInfo::new(request.method(), request.url());
    network.emit_request(&info);

    match network.intercept(&info).await {
        Interception::Abort(code) => {
            network.emit_failed(&info, code.clone());
            route.abort(Some(code.as_str())).await
        }
        Interception::Fulfill(mock) => {
            let options = FulfillOptions::builder()
                .status(mock.status)
                .content_type(mock.content_type.clone())
                .body(mock.body.to_vec())
                .build();
            route.fulfill(Some(options)).await?;
            network.emit_response(&info, Some(mock.status), mock.body);
            Ok(())
        }
        Interception::Continue => {
            let forwarded = match forwarded_request(&info, request.initializer()) {
                Ok(forwarded) => http.forward(&forwarded).await,
                Err(e) => Err(e),
            };
            match forwarded {
                Ok(response) => {
                    route.fulfill(Some(fulfill_options(&response))).await?;
                    network.emit_response(&info, Some(response.status), response.body);
                    Ok(())
                }
                Err(e) => {
                    tracing::debug!(url = %info.url, error = %e, "Forwarding request failed");
                    network.emit_failed(&info, DEFAULT_ABORT_CODE);
                    route.abort(Some(DEFAULT_ABORT_CODE)).await
                }
            }
        }
    }
}

/// Rebuilds a routed request from its protocol initializer
/// (`headers: [{name, value}]`, base64 `postData`).
fn forwarded_request(info: &RequestInfo, initializer: &Value) -> Result<HttpRequest> {
    let method = reqwest::Method::from_bytes(info.method.as_bytes())
        .map_err(|_| Error::InvalidArgument(format!("HTTP method '{}'", info.method)))?;
    let mut forwarded = HttpRequest::new(method, info.url.as_str());

    let headers = initializer
        .get("headers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    for header in headers {
        let (Some(name), Some(value)) = (
            header.get("name").and_then(Value::as_str),
            header.get("value").and_then(Value::as_str),
        ) else {
            continue;
        };
        if !SKIPPED_REQUEST_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            forwarded = forwarded.header(name, value);
        }
    }

    if let Some(post_data) = initializer.get("postData").and_then(Value::as_str) {
        let body = base64::engine::general_purpose::STANDARD
            .decode(post_data)
            .map_err(|e| Error::Browser(format!("Undecodable post data: {}", e)))?;
        forwarded = forwarded.body(body);
    }
    Ok(forwarded)
}

/// Status, headers and body of a backend response as route fulfillment.
///
/// Repeated headers are joined with newlines, which is how the route API
/// takes multiple `set-cookie` values.
fn fulfill_options(response: &HttpResponse) -> FulfillOptions {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in &response.headers {
        let name = name.to_ascii_lowercase();
        if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers
            .entry(name)
            .and_modify(|joined| {
                joined.push('\n');
                joined.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    FulfillOptions::builder()
        .status(response.status)
        .headers(headers)
        .body(response.body.to_vec())
        .build()
}

/// One browser page in its own context.
pub struct PlaywrightSurface {
    page: Page,
    context: BrowserContext,
}

impl PlaywrightSurface {
    async fn first(&self, selector: &str) -> Locator {
        self.page.locator(selector).await.first()
    }
}

#[async_trait]
impl Surface for PlaywrightSurface {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url, None).await?;
        Ok(())
    }

    fn url(&self) -> String {
        self.page.url()
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(self.page.locator(selector).await.count().await?)
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.first(selector).await.is_visible().await?)
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        Ok(self.first(selector).await.fill(value, None).await?)
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.first(selector).await.select_option(value, None).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        Ok(self.first(selector).await.click(None).await?)
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        Ok(self.first(selector).await.set_input_files(&path, None).await?)
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        Ok(self.first(selector).await.input_value(None).await?)
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.first(selector).await.text_content().await?)
    }

    async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        Ok(self.first(selector).await.get_attribute(name).await?)
    }

    async fn controls(&self, scope: Option<&str>) -> Result<Vec<ControlSnapshot>> {
        let scope = scope.map(str::to_string);
        let controls: Vec<ControlSnapshot> =
            self.page.evaluate(CONTROLS_SCRIPT, Some(&scope)).await?;
        Ok(controls)
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let state = self.context.storage_state().await?;
        let session_items: Vec<StorageItem> = self
            .page
            .evaluate::<(), _>(SESSION_STORAGE_SCRIPT, None)
            .await?;
        let current = url::Url::parse(&self.page.url())
            .ok()
            .map(|u| u.origin().ascii_serialization());

        let mut origins: Vec<OriginState> = state
            .origins
            .into_iter()
            .map(|origin| OriginState {
                origin: origin.origin,
                local_storage: origin
                    .local_storage
                    .into_iter()
                    .map(|item| StorageItem {
                        name: item.name,
                        value: item.value,
                    })
                    .collect(),
                session_storage: Vec::new(),
            })
            .collect();

        if let Some(current) = current.filter(|_| !session_items.is_empty()) {
            match origins.iter_mut().find(|o| o.origin == current) {
                Some(origin) => origin.session_storage = session_items,
                None => origins.push(OriginState {
                    origin: current,
                    local_storage: Vec::new(),
                    session_storage: session_items,
                }),
            }
        }

        Ok(StorageState {
            cookies: state
                .cookies
                .into_iter()
                .map(|c| Cookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                })
                .collect(),
            origins,
        })
    }

    async fn clear_storage(&self) -> Result<()> {
        self.page
            .evaluate::<(), serde_json::Value>(CLEAR_STORAGE_SCRIPT, None)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.context.close().await?;
        Ok(())
    }
}
