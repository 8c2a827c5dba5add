//! Decoding of the model response into a [`Plan`].
//!
//! The `generateContent` response wraps the model text as
//! `candidates[0].content.parts[0].text`. The text itself should be the plan
//! JSON, though models sometimes wrap it in a ```` ```json ```` fence anyway.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tidymarks_shared::{Plan, Result, TidymarksError};

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// A whole-text code fence, optionally tagged with a language.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").expect("fence regex")
});

/// Pull the model text out of a `generateContent` response body.
pub(crate) fn extract_text(body: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        TidymarksError::classification_parse(format!("response is not valid JSON: {e}"))
    })?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| {
            TidymarksError::classification_parse("response has no candidates[0].content.parts[0].text")
        })
}

/// Remove a surrounding markdown code fence, if the whole text is one.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    match FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Decode a full response body into a plan.
pub(crate) fn parse_response(body: &str) -> Result<Plan> {
    let text = extract_text(body)?;
    Plan::parse(strip_code_fence(&text))
}
