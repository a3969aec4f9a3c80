//! Auxiliary model calls: search-tag generation and section summaries.
//!
//! Both run against the cheaper utility model. Callers treat every failure
//! here as "no signal" rather than aborting the turn.

use async_trait::async_trait;
use cairn_core::error::ProviderError;
use cairn_core::message::Message;
use cairn_core::provider::{ModelProvider, ProviderRequest};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Upper bound on tags taken from one generation.
pub const MAX_GENERATED_TAGS: usize = 8;

/// Extracts search tags from a raw query.
#[async_trait]
pub trait TagGenerator: Send + Sync {
    async fn generate_tags(&self, query: &str) -> Result<Vec<String>, ProviderError>;
}

/// Compresses text to roughly a target size.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, target_tokens: usize) -> Result<String, ProviderError>;
}

/// A tag generator that never produces tags.
pub struct NoTags;

#[async_trait]
impl TagGenerator for NoTags {
    async fn generate_tags(&self, _query: &str) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

/// The utility model, driving both auxiliary calls.
#[derive(Clone)]
pub struct UtilityModel {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl UtilityModel {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TagGenerator for UtilityModel {
    async fn generate_tags(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let request = ProviderRequest::utility(
            &self.model,
            vec![
                Message::system(
                    "Extract up to 8 short search tags from the user's message. \
                     Reply with the tags only, comma separated, lowercase.",
                ),
                Message::user(query),
            ],
        );
        let reply = self.provider.complete(request).await?;
        Ok(parse_tags(&reply))
    }
}

#[async_trait]
impl Summarizer for UtilityModel {
    async fn summarize(&self, text: &str, target_tokens: usize) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            max_tokens: u32::try_from(target_tokens).ok(),
            ..ProviderRequest::utility(
                &self.model,
                vec![
                    Message::system(format!(
                        "Summarize the following content in at most {target_tokens} tokens. \
                         Keep names, paths and instructions verbatim where possible."
                    )),
                    Message::user(text),
                ],
            )
        };
        let summary = self.provider.complete(request).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(ProviderError::InvalidResponse("empty summary".into()));
        }
        Ok(summary.to_string())
    }
}

/// Split a model reply into normalized, deduplicated tags.
pub fn parse_tags(reply: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    reply
        .split([',', '\n'])
        .map(|t| {
            t.trim()
                .trim_start_matches(['#', '-', '*'])
                .trim()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty() && t.len() <= 40)
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_GENERATED_TAGS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::budget::TRUNCATION_MARKER;
    use crate::context::{ContextSection, SectionKind, TokenBudget};
    use crate::test_helpers::{Script, SequentialMockProvider};
    use cairn_core::message::Role;

    #[test]
    fn parse_tags_normalizes_and_dedupes() {
        let tags = parse_tags("Deploy, #CI\n- kubernetes, deploy,  ");
        assert_eq!(tags, vec!["deploy", "ci", "kubernetes"]);
    }

    #[test]
    fn parse_tags_caps_count() {
        let reply = (0..20).map(|i| format!("t{i}")).collect::<Vec<_>>().join(",");
        assert_eq!(parse_tags(&reply).len(), MAX_GENERATED_TAGS);
    }

    #[tokio::test]
    async fn no_tags_is_empty() {
        assert!(NoTags.generate_tags("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn utility_model_tags_come_from_the_reply() {
        let provider = Arc::new(SequentialMockProvider::single_text("Deploy, #Kubernetes, deploy"));
        let model = UtilityModel::new(provider.clone(), "fast");

        let tags = model.generate_tags("how do we ship to the cluster?").await.unwrap();

        assert_eq!(tags, vec!["deploy", "kubernetes"]);
        let request = &provider.requests()[0];
        assert_eq!(request.model, "fast");
        assert!(request.tools.is_empty());
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.messages[1].content, "how do we ship to the cluster?");
    }

    #[tokio::test]
    async fn summary_request_is_capped_at_the_target() {
        let provider = Arc::new(SequentialMockProvider::single_text("  Ship on Fridays. "));
        let model = UtilityModel::new(provider.clone(), "fast");

        let summary = model.summarize("a very long release checklist", 42).await.unwrap();

        assert_eq!(summary, "Ship on Fridays.");
        assert_eq!(provider.requests()[0].max_tokens, Some(42));
    }

    #[tokio::test]
    async fn blank_summary_is_an_invalid_response() {
        let provider = Arc::new(SequentialMockProvider::single_text("   "));
        let model = UtilityModel::new(provider, "fast");

        let err = model.summarize("text", 10).await.unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn offline_utility_model_degrades_to_truncation() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Script::Fail(
            ProviderError::Network("utility model offline".into()),
        )]));
        let budget =
            TokenBudget::new().with_summarizer(Arc::new(UtilityModel::new(provider.clone(), "fast")));
        let notes: Vec<String> = (0..40).map(|i| format!("note item number {i}")).collect();

        let composed = budget
            .compose(&[ContextSection::new(SectionKind::Notes, notes)], 50)
            .await;

        assert_eq!(provider.call_count(), 1);
        let rendered = composed.section(SectionKind::Notes).unwrap();
        assert!(!rendered.summarized);
        assert!(rendered.text.contains("note item number 0"));
        assert!(rendered.text.ends_with(TRUNCATION_MARKER));
    }
}
