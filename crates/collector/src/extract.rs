//! Content extraction.
//!
//! Extractors are pure functions over the payload captured at query time;
//! they never reach back into the live page. This keeps them synchronous,
//! deterministic, and testable without a browser.

use std::collections::BTreeMap;

use thiserror::Error;

use {crate::dedup, gleaner_session::NodeHandle};

/// Why a node could not be turned into a candidate record.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("node has no text content")]
    EmptyText,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// A candidate record before dedup: identity plus extracted fields.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    /// Canonical item id parsed from a permalink, when one was found.
    pub stable_id: Option<String>,
    /// Raw text content, not yet normalized.
    pub text: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Turns one queried node into a candidate record.
///
/// Extraction failures are per-item: the collector counts them and moves on
/// to the next node.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, node: &NodeHandle) -> Result<RawCandidate, ExtractError>;
}

/// Default extractor for feed item payloads captured by the browser control:
/// text, links, timestamp, and accessibility labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedExtractor;

impl ContentExtractor for FeedExtractor {
    fn extract(&self, node: &NodeHandle) -> Result<RawCandidate, ExtractError> {
        let payload = node
            .payload
            .as_object()
            .ok_or_else(|| ExtractError::Malformed("payload is not an object".into()))?;

        let text = payload
            .get("text")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyText);
        }

        let links: Vec<String> = payload
            .get("links")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let stable_id = links.iter().find_map(|href| {
            dedup::stable_id_from_permalink(href)
        });

        let mut fields = BTreeMap::new();
        fields.insert("text".into(), serde_json::Value::String(text.clone()));
        if !links.is_empty() {
            fields.insert("links".into(), serde_json::json!(links));
        }
        if let Some(datetime) = payload.get("datetime").and_then(serde_json::Value::as_str) {
            fields.insert("datetime".into(), serde_json::Value::String(datetime.into()));
        }
        if let Some(labels) = payload.get("labels").filter(|v| v.is_array()) {
            fields.insert("labels".into(), labels.clone());
        }

        Ok(RawCandidate {
            stable_id,
            text,
            fields,
        })
    }
}
