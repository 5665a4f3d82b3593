use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use form_spec::{AnswerSet, AnswersMap, FormDefinition, SubmitError, Submitter, score};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Cbor,
}

/// Builds the exported answer set, attaching totals when the form is graded.
pub fn export_answers(definition: &FormDefinition, answers: &AnswersMap) -> AnswerSet {
    let answer_set = AnswerSet::new(definition.id(), answers.clone());
    let report = score(definition.elements(), answers);
    if report.max > 0.0 {
        answer_set.with_score(report.summary())
    } else {
        answer_set
    }
}

/// Writes the submitted answers to a file.
pub struct FileSubmitter {
    path: PathBuf,
    definition: Arc<FormDefinition>,
    format: ExportFormat,
}

impl FileSubmitter {
    pub fn new(path: PathBuf, definition: Arc<FormDefinition>, format: ExportFormat) -> Self {
        Self {
            path,
            definition,
            format,
        }
    }
}

#[async_trait]
impl Submitter for FileSubmitter {
    async fn submit(&self, answers: &AnswersMap) -> Result<(), SubmitError> {
        let answer_set = export_answers(&self.definition, answers);
        let bytes = match self.format {
            ExportFormat::Json => answer_set
                .to_json_pretty()
                .map(String::into_bytes)
                .map_err(|err| SubmitError::Rejected(err.to_string()))?,
            ExportFormat::Cbor => answer_set
                .to_cbor()
                .map_err(|err| SubmitError::Rejected(err.to_string()))?,
        };
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|err| SubmitError::Transport(format!("{}: {}", self.path.display(), err)))?;
        tracing::info!(path = %self.path.display(), "answers written");
        Ok(())
    }
}
