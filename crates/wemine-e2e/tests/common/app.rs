// Mock application - an in-process stand-in for the WeMine web app
//
// Renders the login, identity-provider, equipment inspection and hazard
// report screens into an in-memory DOM and talks to the backend through the
// session's HttpTransport, so offline mode, rules and recordings apply to its
// traffic exactly as they would to a browser's. UI actions that call the
// backend run as spawned tasks behind a loading spinner.

use super::dom::{Document, Node, NodePath};
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use wemine_e2e::auth::AUTH_TOKEN_KEY;
use wemine_e2e::data::{LOCATIONS, USERS, endpoints, form_codes, messages};
use wemine_e2e::models::{
    self, ApiError, FormDefinition, FormField, HazardReceipt, HazardReportRequest,
    InspectionSubmission, SubmissionReceipt, UserProfile,
};
use wemine_e2e::network::NetworkController;
use wemine_e2e::surface::{Cookie, OriginState, StorageItem};
use wemine_e2e::{
    ControlSnapshot, Error, FieldKind, HttpRequest, HttpResponse, HttpTransport, Launcher,
    Result, StorageState, Surface, SurfaceContext,
};

/// Origin the application is served from
pub const APP_ORIGIN: &str = "http://app.wemine.test";

/// Identity-provider page the login redirects to
pub const SSO_URL: &str = "https://login.microsoftonline.com/wemine/oauth2/v2.0/authorize";

pub const SUBMISSIONS_PATH: &str = "/equipment/inspection/submissions";

/// Default for how long the sync progress bar stays up at least
const MIN_PROGRESS_DISPLAY: Duration = Duration::from_millis(600);

const SYNC_RETRY_INTERVAL: Duration = Duration::from_millis(100);

const SESSION_COOKIE: &str = "wemine_session";

#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Send users through the identity provider after the tenant lookup
    pub sso_redirect: bool,
    /// Show the identity provider's "stay signed in?" page
    pub stay_signed_in_prompt: bool,
    /// Minimum time the master-data progress bar is shown
    pub sync_duration: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            sso_redirect: true,
            stay_signed_in_prompt: true,
            sync_duration: MIN_PROGRESS_DISPLAY,
        }
    }
}

/// Opens one [`MockApp`] per session and keeps them for inspection.
pub struct MockLauncher {
    api_base: String,
    options: AppOptions,
    apps: Mutex<Vec<MockApp>>,
}

impl MockLauncher {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            options: AppOptions::default(),
            apps: Mutex::new(Vec::new()),
        }
    }

    pub fn with_options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    pub fn apps(&self) -> Vec<MockApp> {
        self.apps.lock().clone()
    }

    pub fn last_app(&self) -> Option<MockApp> {
        self.apps.lock().last().cloned()
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn open(&self, context: SurfaceContext) -> Result<Arc<dyn Surface>> {
        let app = MockApp::new(context, self.api_base.clone(), self.options.clone());
        self.apps.lock().push(app.clone());
        Ok(Arc::new(app))
    }
}

#[derive(Default)]
struct AppState {
    doc: Document,
    url: String,
    local: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
    cookies: Vec<Cookie>,
    /// File input name to attached file
    files: BTreeMap<String, PathBuf>,
    definition: Option<FormDefinition>,
    queue: Vec<InspectionSubmission>,
    syncing: bool,
    loading: usize,
    synced_once: bool,
    closed: bool,
}

struct AppInner {
    base_url: String,
    api_base: String,
    http: HttpTransport,
    network: NetworkController,
    options: AppOptions,
    state: Mutex<AppState>,
}

/// One running application instance; clones share it.
#[derive(Clone)]
pub struct MockApp {
    inner: Arc<AppInner>,
}

impl MockApp {
    fn new(context: SurfaceContext, api_base: String, options: AppOptions) -> Self {
        Self {
            inner: Arc::new(AppInner {
                base_url: context.base_url,
                api_base,
                http: context.http,
                network: context.network,
                options,
                state: Mutex::new(AppState {
                    url: "about:blank".to_string(),
                    ..Default::default()
                }),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Submissions waiting for connectivity
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn local_storage(&self, key: &str) -> Option<String> {
        self.inner.state.lock().local.get(key).cloned()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(MockApp) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(task(self.clone()));
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.inner.api_base, path)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match self.local_storage(AUTH_TOKEN_KEY) {
            Some(token) => request.bearer(token),
            None => request,
        }
    }

    async fn api_get(&self, path: &str) -> Result<HttpResponse> {
        let request = self.authorize(HttpRequest::get(self.api_url(path)));
        self.inner.http.send(request).await
    }

    async fn api_post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<HttpResponse> {
        let request = self.authorize(HttpRequest::post(self.api_url(path)).json(body)?);
        self.inner.http.send(request).await
    }

    fn begin_loading(&self) {
        self.with_state(|s| {
            s.loading += 1;
            show_spinner(s);
        });
    }

    fn end_loading(&self) {
        self.with_state(|s| {
            s.loading = s.loading.saturating_sub(1);
            show_spinner(s);
        });
    }

    fn dispatch(&self, action: &str) -> Result<()> {
        match action {
            "continue" => self.on_continue(),
            "sso-next" => self.on_sso_next(),
            "sso-signin" => self.on_sso_sign_in(),
            "sso-stay" => self.enter_shell(),
            "open-equipment" => self.open_equipment(),
            "new-submission" => self.new_submission(),
            "load-form" => self.load_form(),
            "submit-inspection" => return self.submit_inspection(),
            "open-hazard" => self.open_hazard(),
            "new-hazard" => self.new_hazard(),
            "submit-hazard" => return self.submit_hazard(),
            _ => {}
        }
        Ok(())
    }

    // Login

    fn on_continue(&self) {
        let username = self.with_state(|s| {
            replace_children(s, "login-messages", Vec::new());
            value_of(s, "#username")
        });
        self.spawn(|app| async move { app.lookup_user(username).await });
    }

    async fn lookup_user(&self, username: String) {
        let response = match self
            .api_post(endpoints::USER_WHO, &json!({ "username": username }))
            .await
        {
            Ok(response) => response,
            Err(_) => return self.show_login_error(messages::NETWORK_ERROR),
        };
        if !response.ok() {
            let message = response
                .json::<ApiError>()
                .map(|e| e.error)
                .unwrap_or_else(|_| messages::INVALID_CREDENTIALS.to_string());
            return self.show_login_error(&message);
        }

        match self.api_get(endpoints::TENANT_INFO).await {
            Ok(response) if response.ok() => {}
            _ => return self.show_login_error(messages::NETWORK_ERROR),
        }

        let signed_in = self.with_state(|s| s.local.contains_key(AUTH_TOKEN_KEY));
        if signed_in || !self.inner.options.sso_redirect {
            self.enter_shell();
        } else {
            self.with_state(|s| {
                s.url = SSO_URL.to_string();
                s.doc = sso_email_page();
            });
        }
    }

    fn show_login_error(&self, message: &str) {
        let error = Node::new("div")
            .attr("class", "error-message")
            .test_id("error-message")
            .attr("role", "alert")
            .text(message);
        self.with_state(|s| replace_children(s, "login-messages", vec![error]));
    }

    fn on_sso_next(&self) {
        self.with_state(|s| {
            if !value_of(s, "input[name=\"loginfmt\"]").trim().is_empty() {
                s.doc = sso_password_page();
            }
        });
    }

    fn on_sso_sign_in(&self) {
        let entered = self.with_state(|s| !value_of(s, "input[name=\"passwd\"]").is_empty());
        if !entered {
            return;
        }
        if self.inner.options.stay_signed_in_prompt {
            self.with_state(|s| s.doc = stay_signed_in_page());
        } else {
            self.enter_shell();
        }
    }

    /// Back on the application: show the shell and sync master data.
    fn enter_shell(&self) {
        let home = format!("{}/", self.inner.base_url);
        self.with_state(|s| {
            s.url = home;
            s.doc = shell_page(true);
        });
        self.spawn(|app| async move { app.sync_master_data().await });
    }

    async fn sync_master_data(&self) {
        let shown = Instant::now();

        let profile = match self.api_get(endpoints::USER_ME).await {
            Ok(response) if response.ok() => response.json::<UserProfile>().ok(),
            _ => None,
        };
        let master = matches!(
            self.api_get(endpoints::TENANT_MASTER).await,
            Ok(response) if response.ok()
        );
        if let (Some(profile), true) = (&profile, master) {
            join_all(endpoints::AUXILIARY.iter().map(|path| self.api_get(path))).await;
            tokio::time::sleep_until(shown + self.inner.options.sync_duration).await;
            self.with_state(|s| finish_sign_in(s, profile));
        } else {
            tokio::time::sleep_until(shown + self.inner.options.sync_duration).await;
            self.with_state(|s| {
                set_hidden(s, "progress", true);
                replace_children(s, "notices", vec![error_node(messages::NETWORK_ERROR)]);
            });
        }
    }

    // Equipment inspection

    fn open_equipment(&self) {
        self.with_state(|s| replace_children(s, "screen", equipment_screen()));
        self.begin_loading();
        self.spawn(|app| async move {
            let receipts = match app.api_get(SUBMISSIONS_PATH).await {
                Ok(response) if response.ok() => response
                    .json::<Vec<SubmissionReceipt>>()
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            app.with_state(|s| {
                let items = receipts.iter().map(submission_item).collect();
                replace_children(s, "submissions", items);
            });
            app.end_loading();
        });
    }

    fn new_submission(&self) {
        self.with_state(|s| {
            s.definition = None;
            replace_children(s, "screen", submission_page());
        });
        self.begin_loading();
        self.spawn(|app| async move {
            let listed: Vec<(String, String)> = match app.api_get(endpoints::FORMS).await {
                Ok(response) if response.ok() => response
                    .json::<Vec<Value>>()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|f| {
                        let code = f["code"].as_str()?.to_string();
                        let name = f["name"].as_str().unwrap_or_default().to_string();
                        Some((code, name))
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let forms = if listed.is_empty() {
                form_codes::ALL
                    .iter()
                    .map(|c| (c.to_string(), c.to_string()))
                    .collect()
            } else {
                listed
            };

            app.with_state(|s| {
                let options = std::iter::once(option("", "Select a form"))
                    .chain(forms.iter().map(|(code, name)| {
                        option(code, &format!("{} - {}", code, name))
                    }))
                    .collect();
                replace_children(s, "formCode", options);
            });
            app.end_loading();
        });
    }

    fn load_form(&self) {
        let code = self.with_state(|s| {
            s.definition = None;
            s.files.clear();
            for id in ["form-slot", "form-errors", "form-result"] {
                replace_children(s, id, Vec::new());
            }
            value_of(s, "#formCode")
        });
        if code.is_empty() {
            return;
        }

        self.begin_loading();
        self.spawn(|app| async move {
            let path = format!("{}/{}", endpoints::FORMS, code);
            let definition = match app.api_get(&path).await {
                Ok(response) if response.ok() => response.json::<FormDefinition>().ok(),
                _ => None,
            };
            app.with_state(|s| match definition {
                Some(definition) => {
                    replace_children(s, "form-slot", vec![dynamic_form(&definition)]);
                    s.definition = Some(definition);
                }
                None => replace_children(
                    s,
                    "form-errors",
                    vec![error_node("Form could not be loaded")],
                ),
            });
            app.end_loading();
        });
    }

    fn submit_inspection(&self) -> Result<()> {
        let submission = self.with_state(|s| -> Result<Option<InspectionSubmission>> {
            replace_children(s, "form-errors", Vec::new());
            replace_children(s, "form-result", Vec::new());

            let Some(definition) = s.definition.clone() else {
                replace_children(s, "form-errors", vec![error_node(messages::REQUIRED_FIELD)]);
                return Ok(None);
            };

            let mut fields: BTreeMap<String, Value> = BTreeMap::new();
            if let Some(slot) = s.doc.find_id("form-slot") {
                for control in slot.controls() {
                    let Some(name) = control.get("name") else {
                        continue;
                    };
                    let value = control.get("value").unwrap_or_default();
                    match control.input_type() {
                        Some("radio") if !control.has("checked") => {}
                        Some("file") if !value.is_empty() => {
                            let encoded = match s.files.get(name) {
                                Some(path) => models::evidence_data_url(path)?,
                                None => value.to_string(),
                            };
                            fields.insert(name.to_string(), Value::String(encoded));
                        }
                        _ if value.trim().is_empty() => {}
                        _ => {
                            fields.insert(name.to_string(), Value::String(value.to_string()));
                        }
                    }
                }
            }

            let missing: Vec<&str> = definition
                .required_field_names()
                .into_iter()
                .filter(|name| !fields.contains_key(*name))
                .collect();
            if !missing.is_empty() {
                let message = format!("{}: {}", messages::REQUIRED_FIELD, missing.join(", "));
                replace_children(s, "form-errors", vec![error_node(&message)]);
                return Ok(None);
            }

            let equipment_id = fields
                .get("equipmentId")
                .and_then(Value::as_str)
                .unwrap_or("EQ-UNSPECIFIED")
                .to_string();
            Ok(Some(InspectionSubmission {
                form_code: definition.code.clone(),
                form_id: definition.id.clone(),
                submitted_by: s.local.get("username").cloned().unwrap_or_default(),
                submitted_at: chrono::Utc::now().to_rfc3339(),
                equipment_id,
                fields,
            }))
        })?;

        if let Some(submission) = submission {
            self.spawn(|app| async move { app.send_submission(submission).await });
        }
        Ok(())
    }

    async fn send_submission(&self, submission: InspectionSubmission) {
        match self.api_post(endpoints::EQUIPMENT_SUBMIT, &submission).await {
            Ok(response) if response.status == 201 => {
                let receipt = response.json::<SubmissionReceipt>().ok();
                self.with_state(|s| show_submission_success(s, receipt.as_ref()));
            }
            Ok(response) => {
                let message = format!("Submission rejected ({})", response.status);
                self.with_state(|s| replace_children(s, "form-errors", vec![error_node(&message)]));
            }
            Err(e) if e.is_transport_abort() => self.enqueue(submission),
            Err(_) => self.with_state(|s| {
                replace_children(s, "form-errors", vec![error_node(messages::NETWORK_ERROR)])
            }),
        }
    }

    fn enqueue(&self, submission: InspectionSubmission) {
        let start = self.with_state(|s| {
            s.queue.push(submission);
            render_sync_status(s);
            let start = !s.syncing;
            s.syncing = true;
            start
        });
        if start {
            self.spawn(|app| async move { app.sync_queue().await });
        }
    }

    /// Sends queued submissions, oldest first, once the network is back.
    async fn sync_queue(&self) {
        loop {
            tokio::time::sleep(SYNC_RETRY_INTERVAL).await;

            let next = self.with_state(|s| {
                let next = if s.closed { None } else { s.queue.first().cloned() };
                if next.is_none() {
                    s.syncing = false;
                }
                next
            });
            let Some(submission) = next else {
                break;
            };
            if self.inner.network.is_offline() {
                continue;
            }

            match self.api_post(endpoints::EQUIPMENT_SUBMIT, &submission).await {
                Ok(response) if response.status == 201 => {
                    let receipt = response.json::<SubmissionReceipt>().ok();
                    self.with_state(|s| {
                        s.queue.remove(0);
                        render_sync_status(s);
                        show_submission_success(s, receipt.as_ref());
                    });
                }
                Ok(response) => {
                    let message = format!("Submission rejected ({})", response.status);
                    self.with_state(|s| {
                        s.queue.remove(0);
                        render_sync_status(s);
                        replace_children(s, "form-errors", vec![error_node(&message)]);
                    });
                }
                Err(_) => {}
            }
        }
    }

    // Hazard report

    fn open_hazard(&self) {
        self.with_state(|s| replace_children(s, "screen", hazard_screen()));
        self.begin_loading();
        self.spawn(|app| async move {
            let _ = app.api_get(endpoints::LOCATIONS).await;
            app.end_loading();
        });
    }

    fn new_hazard(&self) {
        self.with_state(|s| {
            s.files.clear();
            replace_children(s, "hazard-result", Vec::new());
            replace_children(s, "hazard-slot", vec![hazard_form()]);
        });
    }

    fn submit_hazard(&self) -> Result<()> {
        let request = self.with_state(|s| -> Result<Option<HazardReportRequest>> {
            replace_children(s, "hazard-errors", Vec::new());
            replace_children(s, "hazard-result", Vec::new());

            let Some(form) = s.doc.find_id("hazard-form") else {
                return Ok(None);
            };
            let mut values: BTreeMap<String, String> = BTreeMap::new();
            let mut missing: Vec<String> = Vec::new();
            for control in form.controls() {
                let Some(name) = control.get("name") else {
                    continue;
                };
                let value = control.get("value").unwrap_or_default().trim().to_string();
                if control.has("required") && value.is_empty() {
                    missing.push(name.to_string());
                }
                values.insert(name.to_string(), value);
            }
            if !missing.is_empty() {
                let message = format!("{}: {}", messages::REQUIRED_FIELD, missing.join(", "));
                replace_children(s, "hazard-errors", vec![error_node(&message)]);
                return Ok(None);
            }

            let evidence = match s.files.get("evidence") {
                Some(path) => models::evidence_data_url(path)?,
                None => String::new(),
            };
            let take = |key: &str| values.get(key).cloned().unwrap_or_default();
            Ok(Some(HazardReportRequest {
                location: take("location"),
                sublocation: take("sublocation"),
                area: take("area"),
                area_description: take("areaDescription"),
                evidence,
                pic: take("pic"),
                reported_by: s.local.get("username").cloned().unwrap_or_default(),
                reported_at: chrono::Utc::now().to_rfc3339(),
            }))
        })?;

        if let Some(request) = request {
            self.spawn(|app| async move { app.send_hazard(request).await });
        }
        Ok(())
    }

    async fn send_hazard(&self, request: HazardReportRequest) {
        let outcome = match self.api_post(endpoints::SAFETY_HAZARD, &request).await {
            Ok(response) if response.status == 201 => response
                .json::<HazardReceipt>()
                .map_err(|e| e.to_string()),
            Ok(response) => Err(format!("Report rejected ({})", response.status)),
            Err(_) => Err(messages::NETWORK_ERROR.to_string()),
        };
        self.with_state(|s| match outcome {
            Ok(receipt) => replace_children(
                s,
                "hazard-result",
                vec![
                    Node::new("div")
                        .test_id("success-message")
                        .attr("class", "alert-success")
                        .text("Hazard reported"),
                    Node::new("span")
                        .test_id("hazard-number")
                        .attr("class", "hazard-number")
                        .text(receipt.hazard_number),
                ],
            ),
            Err(message) => replace_children(s, "hazard-errors", vec![error_node(&message)]),
        });
    }

    // DOM access

    fn locate(s: &AppState, selector: &str) -> Result<NodePath> {
        s.doc
            .query(selector)
            .map_err(|e| Error::InvalidArgument(format!("selector '{}': {}", selector, e)))?
            .ok_or_else(|| Error::ElementNotFound(selector.to_string()))
    }

    fn actionable(s: &AppState, selector: &str) -> Result<NodePath> {
        let path = Self::locate(s, selector)?;
        if !s.doc.is_visible(&path) {
            return Err(Error::Browser(format!("element '{}' is not visible", selector)));
        }
        Ok(path)
    }
}

#[async_trait]
impl Surface for MockApp {
    async fn goto(&self, url: &str) -> Result<()> {
        let base = self.inner.base_url.clone();
        self.with_state(|s| {
            let path = url.strip_prefix(base.as_str()).unwrap_or(url);
            if path.starts_with("/login") || !s.local.contains_key(AUTH_TOKEN_KEY) {
                s.url = format!("{}/login", base);
                s.doc = login_page();
            } else {
                s.url = url.to_string();
                s.doc = shell_page(false);
            }
        });
        Ok(())
    }

    fn url(&self) -> String {
        self.inner.state.lock().url.clone()
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let s = self.inner.state.lock();
        s.doc
            .query_all(selector)
            .map(|matches| matches.len())
            .map_err(|e| Error::InvalidArgument(format!("selector '{}': {}", selector, e)))
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let s = self.inner.state.lock();
        match Self::locate(&s, selector) {
            Ok(path) => Ok(s.doc.is_visible(&path)),
            Err(Error::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.with_state(|s| {
            let path = Self::actionable(s, selector)?;
            let node = s.doc.node_mut(&path);
            let fillable = node.tag == "textarea"
                || matches!(
                    node.input_type(),
                    Some("text" | "email" | "password" | "number" | "date" | "datetime-local")
                );
            if !fillable {
                return Err(Error::Browser(format!("element '{}' cannot be filled", selector)));
            }
            node.set("value", value);
            Ok(())
        })
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let action = self.with_state(|s| {
            let path = Self::actionable(s, selector)?;
            let node = s.doc.node_mut(&path);
            if node.tag != "select" {
                return Err(Error::Browser(format!("element '{}' is not a select", selector)));
            }
            if !node.children.iter().any(|o| o.get("value") == Some(value)) {
                return Err(Error::Browser(format!(
                    "select '{}' has no option '{}'",
                    selector, value
                )));
            }
            node.set("value", value);
            Ok(node.get("data-on-change").map(str::to_string))
        })?;
        match action {
            Some(action) => self.dispatch(&action),
            None => Ok(()),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let action = self.with_state(|s| {
            let path = Self::actionable(s, selector)?;
            let (input_type, name) = {
                let node = s.doc.node(&path);
                (
                    node.input_type().map(str::to_string),
                    node.get("name").map(str::to_string),
                )
            };
            match (input_type.as_deref(), name) {
                (Some("radio"), Some(name)) => {
                    s.doc.root.for_each_mut(&mut |n| {
                        if n.input_type() == Some("radio") && n.get("name") == Some(name.as_str()) {
                            n.remove("checked");
                        }
                    });
                    s.doc.node_mut(&path).set("checked", "");
                }
                (Some("checkbox"), _) => {
                    let node = s.doc.node_mut(&path);
                    if node.has("checked") {
                        node.remove("checked");
                    } else {
                        node.set("checked", "");
                    }
                }
                _ => {}
            }
            Ok::<_, Error>(s.doc.node(&path).get("data-action").map(str::to_string))
        })?;
        match action {
            Some(action) => self.dispatch(&action),
            None => Ok(()),
        }
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::InvalidArgument(format!(
                "no such file: {}",
                path.display()
            )));
        }
        self.with_state(|s| {
            let node_path = Self::actionable(s, selector)?;
            let node = s.doc.node_mut(&node_path);
            if node.input_type() != Some("file") {
                return Err(Error::Browser(format!("element '{}' is not a file input", selector)));
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            node.set("value", file_name);
            let name = node.get("name").unwrap_or_default().to_string();
            s.files.insert(name, path.to_path_buf());
            Ok(())
        })
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        let s = self.inner.state.lock();
        let path = Self::locate(&s, selector)?;
        let node = s.doc.node(&path);
        if !node.is_control() {
            return Err(Error::Browser(format!("element '{}' is not a control", selector)));
        }
        Ok(node.get("value").unwrap_or_default().to_string())
    }

    async fn text_content(&self, selector: &str) -> Result<Option<String>> {
        let s = self.inner.state.lock();
        let path = Self::locate(&s, selector)?;
        Ok(Some(s.doc.node(&path).text_content()))
    }

    async fn get_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let s = self.inner.state.lock();
        let path = Self::locate(&s, selector)?;
        Ok(s.doc.node(&path).get(name).map(str::to_string))
    }

    async fn controls(&self, scope: Option<&str>) -> Result<Vec<ControlSnapshot>> {
        let s = self.inner.state.lock();
        let root = match scope {
            Some(scope) => match s.doc.query(scope) {
                Ok(Some(path)) => s.doc.node(&path),
                Ok(None) => return Ok(Vec::new()),
                Err(e) => {
                    return Err(Error::InvalidArgument(format!("selector '{}': {}", scope, e)));
                }
            },
            None => &s.doc.root,
        };
        Ok(root.controls().into_iter().map(snapshot).collect())
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let s = self.inner.state.lock();
        let items = |map: &BTreeMap<String, String>| -> Vec<StorageItem> {
            map.iter()
                .map(|(name, value)| StorageItem {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect()
        };
        let origins = if s.local.is_empty() && s.session.is_empty() {
            Vec::new()
        } else {
            vec![OriginState {
                origin: self.inner.base_url.clone(),
                local_storage: items(&s.local),
                session_storage: items(&s.session),
            }]
        };
        Ok(StorageState {
            cookies: s.cookies.clone(),
            origins,
        })
    }

    async fn clear_storage(&self) -> Result<()> {
        self.with_state(|s| {
            s.local.clear();
            s.session.clear();
            s.cookies.clear();
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.with_state(|s| {
            s.closed = true;
            s.doc = Document::default();
            s.url = "about:blank".to_string();
        });
        Ok(())
    }
}

fn snapshot(node: &Node) -> ControlSnapshot {
    let owned = |name: &str| node.get(name).map(str::to_string);
    ControlSnapshot {
        tag: node.tag.clone(),
        input_type: node.input_type().map(str::to_string),
        name: owned("name"),
        id: owned("id"),
        test_id: owned("data-testid"),
        value: node.get("value").unwrap_or_default().to_string(),
        checked: node.has("checked"),
        required: node.has("required"),
        label: owned("aria-label"),
    }
}

fn value_of(s: &AppState, selector: &str) -> String {
    s.doc
        .query(selector)
        .ok()
        .flatten()
        .and_then(|path| s.doc.node(&path).get("value").map(str::to_string))
        .unwrap_or_default()
}

fn replace_children(s: &mut AppState, id: &str, children: Vec<Node>) {
    if let Some(node) = s.doc.find_id_mut(id) {
        node.children = children;
    }
}

fn set_hidden(s: &mut AppState, id: &str, hidden: bool) {
    if let Some(node) = s.doc.find_id_mut(id) {
        node.set_hidden(hidden);
    }
}

fn show_spinner(s: &mut AppState) {
    let hidden = s.loading == 0;
    set_hidden(s, "spinner", hidden);
}

fn error_node(message: &str) -> Node {
    Node::new("div")
        .attr("class", "error-message")
        .test_id("form-error")
        .attr("role", "alert")
        .text(message)
}

fn option(value: &str, label: &str) -> Node {
    Node::new("option").attr("value", value).text(label)
}

fn finish_sign_in(s: &mut AppState, profile: &UserProfile) {
    let token = format!("session-{}-{}", profile.id, chrono::Utc::now().timestamp_millis());
    s.local.insert(AUTH_TOKEN_KEY.to_string(), token.clone());
    s.local.insert("username".to_string(), profile.username.clone());
    s.cookies = vec![Cookie {
        name: SESSION_COOKIE.to_string(),
        value: token,
        domain: APP_ORIGIN.trim_start_matches("http://").to_string(),
        path: "/".to_string(),
    }];

    set_hidden(s, "progress", true);
    if let Some(header) = s.doc.find_id_mut("app-header") {
        header.children.push(
            Node::new("span")
                .test_id("profile-icon")
                .attr("class", "user-profile")
                .text(profile.username.clone()),
        );
    }
    if !s.synced_once {
        s.synced_once = true;
        if let Some(notices) = s.doc.find_id_mut("notices") {
            notices.children.push(
                Node::new("div")
                    .test_id("restart-prompt")
                    .attr("class", "restart-notification")
                    .text("Master data updated. Restart the app to apply it."),
            );
        }
    }
}

fn render_sync_status(s: &mut AppState) {
    let queued = s.queue.len();
    let status = if queued > 0 {
        Node::new("div")
            .attr("id", "sync-status")
            .test_id("sync-status")
            .attr("data-state", "queued")
            .attr("class", "sync-status queued")
            .text(format!("{} submission(s) queued, will sync when back online", queued))
    } else {
        Node::new("div")
            .attr("id", "sync-status")
            .test_id("sync-status")
            .attr("data-state", "synced")
            .attr("class", "sync-status synced")
            .text("All submissions synced")
    };
    if let Some(notices) = s.doc.find_id_mut("notices") {
        notices.children.retain(|n| n.get("id") != Some("sync-status"));
        notices.children.push(status);
    }
}

fn show_submission_success(s: &mut AppState, receipt: Option<&SubmissionReceipt>) {
    let number = receipt
        .map(|r| r.submission_number.clone())
        .unwrap_or_default();
    replace_children(
        s,
        "form-result",
        vec![
            Node::new("div")
                .test_id("success-message")
                .attr("class", "alert-success")
                .text(format!("Inspection {} submitted", number)),
        ],
    );
}

// Pages

fn login_page() -> Document {
    Document::new([Node::new("div").attr("class", "login-page").children([
        Node::new("h1").text("WeMine"),
        Node::new("label").attr("for", "username").text("Username"),
        Node::new("input")
            .attr("id", "username")
            .attr("name", "username")
            .attr("type", "text")
            .test_id("username-input"),
        Node::new("button")
            .attr("type", "button")
            .test_id("continue-btn")
            .attr("data-action", "continue")
            .text("Continue"),
        Node::new("div").attr("id", "login-messages"),
    ])])
}

fn sso_email_page() -> Document {
    Document::new([Node::new("div").attr("class", "sso").children([
        Node::new("div").attr("class", "title").text("Enter your account"),
        Node::new("input").attr("type", "email").attr("name", "loginfmt"),
        Node::new("input")
            .attr("type", "submit")
            .attr("value", "Next")
            .attr("data-action", "sso-next"),
    ])])
}

fn sso_password_page() -> Document {
    Document::new([Node::new("div").attr("class", "sso").children([
        Node::new("div").attr("class", "title").text("Enter password"),
        Node::new("input").attr("type", "password").attr("name", "passwd"),
        Node::new("input")
            .attr("type", "submit")
            .attr("value", "Sign in")
            .attr("data-action", "sso-signin"),
    ])])
}

fn stay_signed_in_page() -> Document {
    Document::new([Node::new("div").attr("class", "sso").children([
        Node::new("div").attr("class", "title").text("Stay signed in?"),
        Node::new("input")
            .attr("type", "submit")
            .attr("value", "Yes")
            .attr("data-action", "sso-stay"),
        Node::new("input")
            .attr("type", "button")
            .attr("value", "No")
            .attr("data-action", "sso-stay"),
    ])])
}

fn shell_page(syncing: bool) -> Document {
    Document::new([
        Node::new("header")
            .attr("id", "app-header")
            .child(Node::new("span").attr("class", "brand").text("WeMine")),
        Node::new("nav").children([
            Node::new("a")
                .test_id("equipment-inspection-menu")
                .attr("href", "#/equipment")
                .attr("data-action", "open-equipment")
                .text("Equipment Inspection"),
            Node::new("a")
                .test_id("hazard-report-menu")
                .attr("href", "#/hazard")
                .attr("data-action", "open-hazard")
                .text("Hazard Report"),
        ]),
        Node::new("div")
            .attr("id", "progress")
            .test_id("progress-bar")
            .attr("class", "progress-bar")
            .flag_if("hidden", !syncing)
            .text("Syncing master data"),
        Node::new("div")
            .attr("id", "spinner")
            .attr("class", "loading")
            .flag("hidden"),
        Node::new("div").attr("id", "notices"),
        Node::new("main").attr("id", "screen"),
    ])
}

fn equipment_screen() -> Vec<Node> {
    vec![Node::new("section").test_id("equipment-inspection").children([
        Node::new("h2").text("Equipment Inspection"),
        Node::new("button")
            .attr("type", "button")
            .test_id("new-submission-btn")
            .attr("data-action", "new-submission")
            .text("New Submission"),
        Node::new("ul")
            .attr("id", "submissions")
            .test_id("submissions-list")
            .attr("class", "submissions-list"),
    ])]
}

fn submission_item(receipt: &SubmissionReceipt) -> Node {
    Node::new("li").attr("class", "submission-item").text(format!(
        "{} - {} - {}",
        receipt.submission_number, receipt.form_code, receipt.status
    ))
}

fn submission_page() -> Vec<Node> {
    vec![Node::new("section").test_id("submission-form").children([
        Node::new("label").attr("for", "formCode").text("Form"),
        Node::new("select")
            .attr("id", "formCode")
            .attr("name", "formCode")
            .test_id("form-code-select")
            .flag("required")
            .attr("data-on-change", "load-form")
            .child(option("", "Select a form")),
        Node::new("div").attr("id", "form-slot"),
        Node::new("div").attr("id", "form-errors"),
        Node::new("button")
            .attr("type", "submit")
            .test_id("submit-btn")
            .attr("data-action", "submit-inspection")
            .text("Submit"),
        Node::new("div").attr("id", "form-result"),
    ])]
}

fn dynamic_form(definition: &FormDefinition) -> Node {
    Node::new("div")
        .test_id("dynamic-form")
        .attr("class", "dynamic-form-container")
        .attr("data-form-code", definition.code.clone())
        .children(definition.ordered_fields().into_iter().map(form_field))
}

/// Renders one field the way the application's form renderer does.
///
/// Fields of types the renderer does not know are plain inputs with a
/// `name` only.
fn form_field(field: &FormField) -> Node {
    let name = field.name.as_str();
    let label = Node::new("label").attr("for", name).text(field.label.clone());
    let control = match field.field_kind() {
        FieldKind::Text if field.kind == "text" => Node::new("input")
            .attr("type", "text")
            .attr("id", name)
            .attr("name", name)
            .test_id(&format!("{}-input", name)),
        FieldKind::Text => Node::new("input")
            .attr("type", field.kind.clone())
            .attr("name", name),
        FieldKind::Date => Node::new("input")
            .attr(
                "type",
                if field.kind == "datetime" { "datetime-local" } else { "date" },
            )
            .attr("id", name)
            .attr("name", name)
            .test_id(&format!("{}-date", name)),
        FieldKind::Select => Node::new("select")
            .attr("id", name)
            .attr("name", name)
            .test_id(&format!("{}-select", name))
            .child(option("", "Select..."))
            .children(field.options.iter().map(|o| option(&o.value, &o.label))),
        FieldKind::Radio => Node::new("div")
            .test_id(&format!("{}-radio", name))
            .attr("role", "radiogroup")
            .children(field.options.iter().map(|o| {
                Node::new("label").text(o.label.clone()).child(
                    Node::new("input")
                        .attr("type", "radio")
                        .attr("id", format!("{}-{}", name, o.value))
                        .attr("name", name)
                        .attr("value", o.value.clone())
                        .test_id(&format!("{}-{}", name, o.value))
                        .flag_if("required", field.required),
                )
            })),
        FieldKind::Image => Node::new("input")
            .attr("type", "file")
            .attr("accept", "image/*")
            .attr("id", name)
            .attr("name", name)
            .test_id(&format!("{}-image", name)),
    };
    let control = if field.kind == "radio" {
        control
    } else {
        control.flag_if("required", field.required)
    };
    Node::new("div")
        .attr("class", "form-field")
        .child(label)
        .child(control)
}

fn hazard_screen() -> Vec<Node> {
    vec![Node::new("section").test_id("hazard-report").children([
        Node::new("h2").text("Hazard Report"),
        Node::new("button")
            .attr("type", "button")
            .test_id("new-hazard-btn")
            .attr("data-action", "new-hazard")
            .text("Report Hazard"),
        Node::new("div").attr("id", "hazard-slot"),
        Node::new("div").attr("id", "hazard-result"),
    ])]
}

fn select_field(name: &str, label: &str, values: &[&str]) -> Node {
    Node::new("div").attr("class", "form-field").children([
        Node::new("label").attr("for", name).text(label),
        Node::new("select")
            .attr("id", name)
            .attr("name", name)
            .test_id(&format!("{}-select", name))
            .flag("required")
            .child(option("", "Select..."))
            .children(values.iter().map(|v| option(v, v))),
    ])
}

fn hazard_form() -> Node {
    let column = |f: fn(&wemine_e2e::data::TestLocation) -> &'static str| -> Vec<&'static str> {
        LOCATIONS.iter().map(f).collect()
    };
    let people: Vec<&str> = USERS.iter().map(|u| u.username).collect();

    Node::new("form")
        .attr("id", "hazard-form")
        .test_id("hazard-form")
        .attr("class", "hazard-report")
        .children([
            select_field("location", "Location", &column(|l| l.location)),
            select_field("sublocation", "Sublocation", &column(|l| l.sublocation)),
            select_field("area", "Area", &column(|l| l.area)),
            Node::new("div").attr("class", "form-field").children([
                Node::new("label")
                    .attr("for", "areaDescription")
                    .text("Area Description"),
                Node::new("textarea")
                    .attr("id", "areaDescription")
                    .attr("name", "areaDescription")
                    .test_id("areaDescription-input")
                    .flag("required"),
            ]),
            Node::new("div").attr("class", "form-field").children([
                Node::new("label").attr("for", "evidence").text("Evidence"),
                Node::new("input")
                    .attr("type", "file")
                    .attr("accept", "image/*")
                    .attr("id", "evidence")
                    .attr("name", "evidence")
                    .test_id("evidence-image")
                    .flag("required"),
            ]),
            select_field("pic", "Person in Charge", &people),
            Node::new("div").attr("id", "hazard-errors"),
            Node::new("button")
                .attr("type", "submit")
                .test_id("submit-hazard-btn")
                .attr("data-action", "submit-hazard")
                .text("Submit Report"),
        ])
}
