use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;

use crate::answers::AnswersMap;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("submission transport failed: {0}")]
    Transport(String),
}

/// Receives the full answer map when a form is submitted.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, answers: &AnswersMap) -> Result<(), SubmitError>;
}

/// Accepts every submission and does nothing with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSubmitter;

#[async_trait]
impl Submitter for NoopSubmitter {
    async fn submit(&self, _answers: &AnswersMap) -> Result<(), SubmitError> {
        Ok(())
    }
}

/// Future returned by [`FnSubmitter`] callbacks.
pub type SubmitFuture = Pin<Box<dyn Future<Output = Result<(), SubmitError>> + Send>>;

/// Adapts a closure returning a future. The closure gets an owned copy of the answers.
pub struct FnSubmitter<F> {
    callback: F,
}

impl<F> FnSubmitter<F>
where
    F: Fn(AnswersMap) -> SubmitFuture + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> Submitter for FnSubmitter<F>
where
    F: Fn(AnswersMap) -> SubmitFuture + Send + Sync,
{
    async fn submit(&self, answers: &AnswersMap) -> Result<(), SubmitError> {
        (self.callback)(answers.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn closure_submitter_sees_answers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let submitter = FnSubmitter::new(move |answers: AnswersMap| -> SubmitFuture {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(answers.len(), Ordering::SeqCst);
                Ok(())
            })
        });

        let mut answers = AnswersMap::new();
        answers.insert("q1".into(), serde_json::json!("a"));
        submitter.submit(&answers).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closure_submitter_propagates_rejection() {
        let submitter = FnSubmitter::new(|_answers: AnswersMap| -> SubmitFuture {
            Box::pin(async { Err(SubmitError::Rejected("offline".into())) })
        });
        let error = submitter.submit(&AnswersMap::new()).await.unwrap_err();
        assert_eq!(error.to_string(), "submission rejected: offline");
    }
}
