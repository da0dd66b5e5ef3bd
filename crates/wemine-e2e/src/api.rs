// ApiClient - direct backend calls for API-only tests
//
// Calls go through the session's HttpTransport, so network rules and
// recordings apply. Status checks are explicit per call: each method states
// the statuses it accepts and returns `UnexpectedStatus` otherwise.

use crate::config::{Role, SuiteConfig};
use crate::data::endpoints;
use crate::error::{Error, Result};
use crate::models::{
    ApiError, FormDefinition, HazardReceipt, HazardReportRequest, InspectionSubmission,
    SubmissionReceipt, UserLookup, UserProfile, UserWhoRequest,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Outcome of a user lookup: found, or the backend's 404 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(UserLookup),
    NotFound(ApiError),
}

/// Typed client for the backend API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: HttpTransport,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(http: HttpTransport, base_url: &str, token: impl Into<String>) -> Result<Self> {
        // A trailing slash keeps the last path segment when joining
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| {
            Error::InvalidArgument(format!("invalid API base URL '{}': {}", base_url, e))
        })?;
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// Client for the configured API origin and default token.
    pub fn from_config(http: HttpTransport, config: &SuiteConfig) -> Result<Self> {
        Self::new(http, &config.api_base_url, config.api_token.clone())
    }

    /// Same client with another bearer token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.into(),
        }
    }

    /// Same client acting as `role`.
    pub fn as_role(&self, config: &SuiteConfig, role: Role) -> Self {
        self.with_token(config.role_tokens.for_role(role))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Absolute URL of `path` under the API base.
    pub fn endpoint(&self, path: &str) -> Result<String> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| Error::InvalidArgument(format!("invalid API path '{}': {}", path, e)))
    }

    /// `POST /user/who`. 200 and 404 are both valid answers.
    pub async fn user_who(&self, username: &str) -> Result<LookupOutcome> {
        let request = UserWhoRequest {
            username: username.to_string(),
        };
        let response = self.post(endpoints::USER_WHO, &request).await?;
        match response.status {
            200 => Ok(LookupOutcome::Found(response.json()?)),
            404 => Ok(LookupOutcome::NotFound(response.json()?)),
            _ => Err(unexpected(response, &[200, 404])),
        }
    }

    /// `GET /user/me`
    pub async fn user_me(&self) -> Result<UserProfile> {
        self.get_json(endpoints::USER_ME, &[200]).await
    }

    /// `GET /forms/{code}`
    pub async fn form_definition(&self, code: &str) -> Result<FormDefinition> {
        self.get_json(&format!("{}/{}", endpoints::FORMS, code), &[200])
            .await
    }

    /// `POST /equipment/inspection/submit`, expecting 201.
    pub async fn submit_inspection(
        &self,
        submission: &InspectionSubmission,
    ) -> Result<SubmissionReceipt> {
        let response = self.post(endpoints::EQUIPMENT_SUBMIT, submission).await?;
        response.expect_status(&[201])?.json()
    }

    /// `POST /safety/hazard`, expecting 201.
    pub async fn create_hazard(&self, report: &HazardReportRequest) -> Result<HazardReceipt> {
        let response = self.post(endpoints::SAFETY_HAZARD, report).await?;
        response.expect_status(&[201])?.json()
    }

    /// Raw GET for calls without a typed wrapper.
    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        let request = HttpRequest::get(self.endpoint(path)?).bearer(self.token.as_str());
        self.http.send(request).await
    }

    /// Raw JSON POST for calls without a typed wrapper.
    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<HttpResponse> {
        let request = HttpRequest::post(self.endpoint(path)?)
            .bearer(self.token.as_str())
            .json(body)?;
        self.http.send(request).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, expected: &[u16]) -> Result<T> {
        self.get(path).await?.expect_status(expected)?.json()
    }
}

fn unexpected(response: HttpResponse, expected: &[u16]) -> Error {
    Error::UnexpectedStatus {
        url: response.url,
        expected: expected.to_vec(),
        actual: response.status,
    }
}
