//! Plan requestor: asks a language model for an organization plan.
//!
//! The engine sees only the [`Classifier`] trait. [`GeminiClassifier`] is the
//! production implementation, calling the Gemini `generateContent` endpoint
//! once per request with no retries.

mod parser;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tidymarks_shared::{
    ExistingFolder, FlatBookmark, GeminiConfig, Plan, Result, TidymarksError,
};
use tracing::{debug, info, instrument};
use url::Url;

/// User-Agent string for classifier requests.
const USER_AGENT: &str = concat!("Tidymarks/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything the classifier is told about one organization run.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub organization_type: String,
    pub bookmarks: Vec<FlatBookmark>,
    pub existing_folders: Vec<ExistingFolder>,
}

impl ClassificationRequest {
    /// The user message for this request.
    pub fn user_content(&self) -> String {
        prompt::user_content(
            &self.organization_type,
            &self.bookmarks,
            &self.existing_folders,
        )
    }

    /// Stable hash of the full prompt plus the model, used as a cache key.
    pub fn request_hash(&self, model_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0]);
        hasher.update(prompt::combined_prompt(&self.user_content()).as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Classifier trait
// ---------------------------------------------------------------------------

/// Produces a [`Plan`] for a request.
///
/// Transport failures surface as [`TidymarksError::ClassificationTransport`];
/// an answer that is not a valid plan as
/// [`TidymarksError::ClassificationParse`].
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Identifier of the model answering requests, recorded with stored plans.
    fn model_id(&self) -> &str;

    async fn classify(&self, request: &ClassificationRequest) -> Result<Plan>;
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent; 1],
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: [RequestPart; 1],
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f64,
    response_mime_type: &'a str,
}

/// Classifier backed by the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClassifier {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f64,
}

impl GeminiClassifier {
    /// Build a classifier from config and an already-resolved API key.
    pub fn new(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!(
            "{base}/v1beta/models/{}:generateContent",
            config.model
        ))
        .map_err(|e| TidymarksError::config(format!("invalid Gemini endpoint: {e}")))?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint,
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// The full `generateContent` URL this classifier posts to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, bookmarks = request.bookmarks.len()))]
    async fn classify(&self, request: &ClassificationRequest) -> Result<Plan> {
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart {
                    text: prompt::combined_prompt(&request.user_content()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
            },
        };

        info!(
            organization_type = %request.organization_type,
            existing_folders = request.existing_folders.len(),
            "requesting organization plan"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TidymarksError::ClassificationTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            debug!(%status, detail = %detail, "classifier returned an error status");
            return Err(TidymarksError::ClassificationTransport(format!(
                "HTTP {status}"
            )));
        }

        let text = response.text().await.map_err(|e| {
            TidymarksError::ClassificationTransport(format!("failed to read body: {e}"))
        })?;

        let plan = parser::parse_response(&text)?;
        info!(
            folders = plan.folder_count(),
            references = plan.referenced_ids().len(),
            "plan received"
        );
        Ok(plan)
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| {
            TidymarksError::ClassificationTransport(format!("failed to build HTTP client: {e}"))
        })
}
