use std::collections::HashSet;

use form_spec::{
    Advance, FieldRegistry, FlowError, FlowMode, FormSession, SessionStatus, SubmitOutcome,
    TimerHandle, build_slide_payload, render_correction_text, render_preview_text,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::watch;

use crate::CliResult;
use crate::submitter::export_answers;
use crate::wizard::{PromptContext, SlidePresenter};

enum Input {
    Line(String),
    Expired,
    Closed,
}

/// Drives one session from line-based input until it is submitted.
pub struct Runner<R> {
    session: FormSession,
    registry: FieldRegistry,
    presenter: SlidePresenter,
    lines: Lines<R>,
    status: watch::Receiver<SessionStatus>,
    timer: Option<TimerHandle>,
    expiry_announced: bool,
}

impl<R: AsyncBufRead + Unpin> Runner<R> {
    pub fn new(
        session: FormSession,
        registry: FieldRegistry,
        presenter: SlidePresenter,
        input: R,
        timer: Option<TimerHandle>,
    ) -> Self {
        let status = session.subscribe();
        Self {
            session,
            registry,
            presenter,
            lines: input.lines(),
            status,
            timer,
            expiry_announced: false,
        }
    }

    pub async fn run(mut self) -> CliResult<()> {
        loop {
            let status = self.session.status();
            if status.locked && !self.expiry_announced {
                self.expiry_announced = true;
                self.presenter.show_expired();
            }
            if status.is_submitting {
                self.wait_until(|status| !status.is_submitting).await;
                continue;
            }

            match status.mode {
                FlowMode::Correction => {
                    let report = self.session.with_engine(|engine| engine.score()).await;
                    self.presenter
                        .show_correction(&render_correction_text(&report));
                    return self.finish().await;
                }
                _ if status.submitted => {
                    self.show_current_slide().await;
                    return self.finish().await;
                }
                FlowMode::Previewing => self.review(status.locked).await?,
                FlowMode::Filling if status.locked => self.retry_submit().await?,
                FlowMode::Filling => self.fill_slide().await?,
            }
        }
    }

    async fn show_current_slide(&self) {
        let remaining = self.session.status().remaining_seconds;
        let registry = &self.registry;
        let payload = self
            .session
            .with_engine(|engine| build_slide_payload(engine, registry, remaining))
            .await;
        self.presenter.show_slide(&payload);
    }

    async fn fill_slide(&mut self) -> CliResult<()> {
        self.show_current_slide().await;

        let mut prompted = HashSet::new();
        while let Some(prompt) = self.next_prompt(&prompted).await {
            prompted.insert(prompt.name.clone());
            self.presenter.show_prompt(&prompt);
            let line = match self.read_input().await? {
                Input::Line(line) => line,
                Input::Expired => return Ok(()),
                Input::Closed => return self.on_closed().await,
            };
            match line.trim() {
                "" => continue,
                ":back" => {
                    self.session.with_engine(|engine| engine.retreat()).await;
                    return Ok(());
                }
                ":quit" => return Err("form aborted by user".into()),
                raw => {
                    if let Err(FlowError::InputLocked) = self.record(&prompt.name, raw).await {
                        self.presenter.show_input_locked();
                    }
                }
            }
        }

        match self.session.with_engine(|engine| engine.advance()).await {
            Advance::Blocked => {
                let errors = self
                    .session
                    .with_engine(|engine| engine.errors().clone())
                    .await;
                self.presenter.show_errors(&errors);
            }
            Advance::Exhausted => return Err("the form has no slides to fill".into()),
            Advance::Moved { .. } | Advance::Preview | Advance::Ignored => {}
        }
        Ok(())
    }

    /// First visible, editable field of the current slide not yet asked on this visit.
    async fn next_prompt(&self, prompted: &HashSet<String>) -> Option<PromptContext> {
        let registry = &self.registry;
        self.session
            .with_engine(|engine| {
                engine
                    .visible_elements()
                    .into_iter()
                    .filter(|element| !element.kind.is_display() && !engine.is_disabled(element))
                    .filter(|element| {
                        element
                            .name
                            .as_ref()
                            .is_some_and(|name| !prompted.contains(name))
                    })
                    .find_map(|element| {
                        let current = element
                            .name
                            .as_deref()
                            .and_then(|name| engine.answers().get(name));
                        PromptContext::new(
                            element,
                            registry.resolve(&element.kind).hint(element),
                            current,
                        )
                    })
            })
            .await
    }

    async fn record(&self, name: &str, raw: &str) -> Result<(), FlowError> {
        let registry = &self.registry;
        self.session
            .with_engine(|engine| {
                let value = match engine.definition().find_element(name) {
                    Some(element) => registry.resolve(&element.kind).parse_input(element, raw),
                    None => serde_json::Value::String(raw.to_string()),
                };
                engine.record_answer(name, value)
            })
            .await
    }

    async fn review(&mut self, locked: bool) -> CliResult<()> {
        let registry = &self.registry;
        let preview = self
            .session
            .with_engine(|engine| render_preview_text(engine, registry))
            .await;
        self.presenter.show_preview(&preview, locked);

        let line = match self.read_input().await? {
            Input::Line(line) => line,
            Input::Expired => return Ok(()),
            Input::Closed => return self.on_closed().await,
        };
        match line.trim().to_lowercase().as_str() {
            "s" | "submit" => self.submit().await,
            "e" | "edit" => {
                if !self.session.with_engine(|engine| engine.edit()).await {
                    self.presenter.show_edit_refused();
                }
            }
            "q" | "quit" | ":quit" => return Err("form aborted by user".into()),
            other => self.presenter.show_unknown_choice(other),
        }
        Ok(())
    }

    /// Filling, locked and unsubmitted: a forced submission failed.
    async fn retry_submit(&mut self) -> CliResult<()> {
        if let Some(error) = self.session.status().last_error {
            self.presenter.show_submit_failure(&error);
        }
        match self.read_input().await? {
            Input::Line(line) if line.trim() == ":quit" => Err("form aborted by user".into()),
            Input::Line(_) | Input::Expired => {
                self.submit().await;
                Ok(())
            }
            Input::Closed => Err("input closed before the form was submitted".into()),
        }
    }

    async fn submit(&self) {
        if let SubmitOutcome::Failed(error) = self.session.submit().await {
            self.presenter.show_submit_failure(&error.to_string());
        }
    }

    /// Reads the next line, returning early when the countdown locks the form.
    async fn read_input(&mut self) -> CliResult<Input> {
        let mut watching = self.timer.is_some() && !self.expiry_announced;
        loop {
            tokio::select! {
                biased;
                changed = self.status.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    } else if self.status.borrow_and_update().locked {
                        return Ok(Input::Expired);
                    }
                }
                line = self.lines.next_line() => {
                    return Ok(match line? {
                        Some(line) => Input::Line(line),
                        None => Input::Closed,
                    });
                }
            }
        }
    }

    async fn on_closed(&mut self) -> CliResult<()> {
        if self.timer.is_some() && !self.expiry_announced {
            self.presenter.show_waiting();
            if self
                .wait_until(|status| status.locked && !status.is_submitting)
                .await
            {
                return Ok(());
            }
        }
        Err("input closed before the form was submitted".into())
    }

    async fn wait_until(&mut self, done: impl FnMut(&SessionStatus) -> bool) -> bool {
        self.status.wait_for(done).await.is_ok()
    }

    async fn finish(mut self) -> CliResult<()> {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        let answer_set = self
            .session
            .with_engine(|engine| export_answers(engine.definition(), engine.answers()))
            .await;
        self.presenter.show_completion(&answer_set);
        Ok(())
    }
}
