use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::types::IntentResult;
use crate::kernel::utterance::NormalizedInput;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier backend failed: {0}")]
    Backend(String),
    #[error("classifier timed out")]
    Timeout,
    #[error("classifier returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Maps normalized text to an intent label plus slots.
///
/// Any backend satisfying this contract is substitutable (rules, a hosted
/// model, a hybrid). Determinism is not required. Implementations should list
/// slots they recognise but could not fill as `None` rather than inventing
/// defaults.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        input: &NormalizedInput,
        recent_history: &[IntentResult],
    ) -> Result<IntentResult, ClassifierError>;
}

#[async_trait]
impl<T: IntentClassifier + ?Sized> IntentClassifier for Arc<T> {
    async fn classify(
        &self,
        input: &NormalizedInput,
        recent_history: &[IntentResult],
    ) -> Result<IntentResult, ClassifierError> {
        (**self).classify(input, recent_history).await
    }
}

/// Try `primary`; on error, answer from `fallback`.
pub struct FallbackClassifier<P, F> {
    primary: P,
    fallback: F,
}

impl<P, F> FallbackClassifier<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P, F> IntentClassifier for FallbackClassifier<P, F>
where
    P: IntentClassifier,
    F: IntentClassifier,
{
    async fn classify(
        &self,
        input: &NormalizedInput,
        recent_history: &[IntentResult],
    ) -> Result<IntentResult, ClassifierError> {
        match self.primary.classify(input, recent_history).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!("Primary classifier failed, using fallback: {}", e);
                self.fallback.classify(input, recent_history).await
            }
        }
    }
}
