use std::collections::BTreeMap;
use std::sync::Arc;

use quiz_core::model::QuestionSequence;
use quiz_core::{NavigationError, NavigationEvent};

use super::session::{CurrentQuestion, PracticeSession, SubmitResult};
use crate::error::{FeedbackError, PracticeError};
use crate::feedback_service::{FeedbackRequest, FeedbackService};
use crate::question_source::QuestionSource;
use crate::stack::{
    GradeOutcome, GradeResponse, RenderResponse, StackClient, StackRequest, ValidationResponse,
};
use crate::tracking_service::{SessionContext, TrackingService};

/// Prefix of the single question block on the practice page.
pub const QUESTION_PREFIX: &str = "q1_";

/// Orchestrates navigation, question loading, grading and tracking.
#[derive(Clone)]
pub struct PracticeService {
    tracking: TrackingService,
    source: Option<QuestionSource>,
    stack: Option<Arc<dyn StackClient>>,
    feedback: Option<Arc<FeedbackService>>,
}

impl PracticeService {
    #[must_use]
    pub fn new(tracking: TrackingService) -> Self {
        Self {
            tracking,
            source: None,
            stack: None,
            feedback: None,
        }
    }

    #[must_use]
    pub fn with_question_source(mut self, source: QuestionSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: Arc<dyn StackClient>) -> Self {
        self.stack = Some(stack);
        self
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: Arc<FeedbackService>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    #[must_use]
    pub fn tracking(&self) -> &TrackingService {
        &self.tracking
    }

    #[must_use]
    pub fn grading_enabled(&self) -> bool {
        self.source.is_some() && self.stack.is_some()
    }

    #[must_use]
    pub fn feedback_enabled(&self) -> bool {
        self.feedback.as_ref().is_some_and(|f| f.enabled())
    }

    /// Open a learning session positioned on the first question.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Tracking` if the learning session cannot be stored.
    pub async fn start(
        &self,
        sequence: QuestionSequence,
        context: SessionContext,
    ) -> Result<PracticeSession, PracticeError> {
        let learning = self.tracking.start_session(context).await?;
        let session = PracticeSession::new(sequence, learning);
        log_event(&session.controller().initial_event()?, false);
        Ok(session)
    }

    /// Load the current question's XML, pick a seed and render it when STACK is configured.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::SourceDisabled` without a question source, and
    /// source or STACK errors from loading and rendering.
    pub async fn open_current<'a>(
        &self,
        session: &'a mut PracticeSession,
    ) -> Result<&'a CurrentQuestion, PracticeError> {
        ensure_active(session)?;
        let source = self.source.as_ref().ok_or(PracticeError::SourceDisabled)?;
        let index = session.controller().current_index();
        let descriptor = session.controller().current()?.clone();

        let loaded = source
            .load(descriptor.file_reference(), descriptor.question_name())
            .await?;
        let seed = loaded.pick_seed();
        let render = match &self.stack {
            Some(stack) => {
                let request =
                    StackRequest::new(loaded.question_xml.clone(), seed, QUESTION_PREFIX);
                Some(stack.render(&request).await?)
            }
            None => None,
        };
        tracing::debug!(index, title = descriptor.title(), ?seed, "question opened");

        session.set_current(CurrentQuestion {
            index,
            loaded,
            seed,
            render,
        });
        session.current_question().ok_or(PracticeError::NotRendered)
    }

    /// Grade `answers` with STACK and record the result for the current question.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotRendered` before `open_current`,
    /// `PracticeError::NotGradable` for incomplete or invalid answers, and
    /// STACK errors from the grading call.
    pub async fn submit_answers(
        &self,
        session: &mut PracticeSession,
        answers: BTreeMap<String, String>,
    ) -> Result<SubmitResult, PracticeError> {
        ensure_active(session)?;
        let stack = self.stack.as_ref().ok_or(PracticeError::StackDisabled)?;
        let current = session
            .current_question()
            .ok_or(PracticeError::NotRendered)?;
        let seed = current.seed;
        let request = StackRequest::new(current.loaded.question_xml.clone(), seed, QUESTION_PREFIX)
            .with_answers(answers.clone());

        let grade = stack.grade(&request).await?;
        let outcome = GradeOutcome::from_response(&grade).inspect_err(|err| {
            tracing::info!(%err, "submission not gradable");
        })?;
        self.record(session, outcome, seed, answers, Some(grade))
            .await
    }

    /// Check one input of the opened question with STACK before submitting.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotRendered` before `open_current`, and STACK
    /// errors from the validation call.
    pub async fn validate_input(
        &self,
        session: &PracticeSession,
        input_name: &str,
        value: &str,
    ) -> Result<ValidationResponse, PracticeError> {
        ensure_active(session)?;
        let stack = self.stack.as_ref().ok_or(PracticeError::StackDisabled)?;
        let current = session
            .current_question()
            .ok_or(PracticeError::NotRendered)?;
        let answers = BTreeMap::from([(input_name.to_string(), value.to_string())]);
        let request =
            StackRequest::new(current.loaded.question_xml.clone(), current.seed, QUESTION_PREFIX)
                .with_answers(answers);

        let validation = stack.validate(&request, input_name).await?;
        tracing::debug!(input_name, "input validated");
        Ok(validation)
    }

    /// Record a result graded outside STACK for the current question.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Finished` once the session has ended.
    pub async fn record_outcome(
        &self,
        session: &mut PracticeSession,
        outcome: GradeOutcome,
        answers: BTreeMap<String, String>,
    ) -> Result<SubmitResult, PracticeError> {
        ensure_active(session)?;
        let seed = session.current_question().and_then(|q| q.seed);
        self.record(session, outcome, seed, answers, None).await
    }

    async fn record(
        &self,
        session: &mut PracticeSession,
        outcome: GradeOutcome,
        seed: Option<i64>,
        answers: BTreeMap<String, String>,
        grade: Option<GradeResponse>,
    ) -> Result<SubmitResult, PracticeError> {
        let now = self.tracking.now();
        let controller = session.controller_mut();
        let index = controller.current_index();
        let descriptor = controller.current()?.clone();
        let entry = controller
            .record_attempt(outcome.passed, outcome.score, now)?
            .clone();
        let all_attempted = controller.progress().is_all_attempted();
        tracing::info!(
            index,
            title = descriptor.title(),
            passed = outcome.passed,
            score = outcome.score,
            all_attempted,
            "attempt graded"
        );

        let attempt = match self
            .tracking
            .record_submission(
                session.session_id(),
                &descriptor,
                QUESTION_PREFIX,
                seed,
                &outcome,
            )
            .await
        {
            Ok(attempt) => Some(attempt),
            Err(err) => {
                tracing::warn!(%err, index, "failed to persist attempt");
                None
            }
        };

        if let Some(attempt) = attempt.as_ref().filter(|_| !answers.is_empty()) {
            let validation = validation_summary(&outcome, grade.as_ref());
            if let Err(err) = self
                .tracking
                .track_final_answers(attempt, &answers, Some(&validation))
                .await
            {
                tracing::warn!(%err, attempt = %attempt.id, "failed to persist final answers");
            }
        }

        let result = SubmitResult {
            entry,
            attempt,
            outcome,
            all_attempted,
            answers,
            grade,
        };
        session.set_last_result(result.clone());
        Ok(result)
    }

    /// Advance to the next or remediation question.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Navigation` while the current question is locked.
    pub fn forward(
        &self,
        session: &mut PracticeSession,
    ) -> Result<Option<NavigationEvent>, PracticeError> {
        ensure_active(session)?;
        let event = session.controller_mut().forward().inspect_err(|err| {
            if let NavigationError::NotYetAttempted { index } = err {
                tracing::debug!(index, "forward blocked until attempted");
            }
        })?;
        if let Some(event) = &event {
            session.clear_current();
            log_event(event, session.controller().is_adaptive());
        }
        Ok(event)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Finished` once the session has ended.
    pub fn backward(
        &self,
        session: &mut PracticeSession,
    ) -> Result<Option<NavigationEvent>, PracticeError> {
        ensure_active(session)?;
        let event = session.controller_mut().backward();
        if let Some(event) = &event {
            session.clear_current();
            log_event(event, false);
        }
        Ok(event)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Navigation` for an unknown index.
    pub fn jump_to(
        &self,
        session: &mut PracticeSession,
        index: usize,
    ) -> Result<NavigationEvent, PracticeError> {
        ensure_active(session)?;
        let event = session.controller_mut().jump_to(index)?;
        session.clear_current();
        log_event(&event, false);
        Ok(event)
    }

    /// Ask the AI tutor about the latest submission on the current question.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Feedback` when feedback is disabled or fails, and
    /// `PracticeError::NotRendered` when nothing has been submitted yet.
    pub async fn feedback(&self, session: &PracticeSession) -> Result<String, PracticeError> {
        ensure_active(session)?;
        let service = self.feedback.as_ref().ok_or(FeedbackError::Disabled)?;
        let result = session.last_result().ok_or(PracticeError::NotRendered)?;
        let descriptor = session.controller().current()?;
        let render = session
            .current_question()
            .and_then(|q| q.render.as_ref());
        let request = feedback_request(descriptor.title(), render, result);
        Ok(service.feedback(&request).await?)
    }

    /// End the learning session. Further calls on the session fail with `Finished`.
    ///
    /// The session stays active when the end time cannot be stored, so the
    /// call can be retried.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Finished` if already finished, or tracking errors.
    pub async fn finish(&self, session: &mut PracticeSession) -> Result<(), PracticeError> {
        ensure_active(session)?;
        self.tracking.end_session(session.session_id()).await?;
        session.mark_finished();
        let view = session.view();
        tracing::info!(
            attempted = view.attempted,
            passed = view.passed,
            total = view.total,
            "practice finished"
        );
        Ok(())
    }
}

fn ensure_active(session: &PracticeSession) -> Result<(), PracticeError> {
    if session.is_finished() {
        return Err(PracticeError::Finished);
    }
    Ok(())
}

fn log_event(event: &NavigationEvent, adaptive: bool) {
    tracing::info!(
        index = event.index,
        title = %event.title,
        file = %event.file_reference,
        reason = ?event.reason,
        adaptive,
        "question loaded"
    );
}

/// Grading details stored next to the final answers of an attempt.
fn validation_summary(
    outcome: &GradeOutcome,
    grade: Option<&GradeResponse>,
) -> serde_json::Value {
    serde_json::json!({
        "score": outcome.score,
        "maxScore": outcome.max_score,
        "isCorrect": outcome.passed,
        "responseSummary": outcome.response_summary,
        "specificFeedback": grade.and_then(|g| g.specificfeedback.as_ref()),
        "prts": grade.map(|g| &g.prts),
    })
}

fn feedback_request(
    title: &str,
    render: Option<&RenderResponse>,
    result: &SubmitResult,
) -> FeedbackRequest {
    let grade = result.grade.as_ref();
    let correct_answer = grade
        .and_then(|g| {
            g.formatcorrectresponse
                .clone()
                .or_else(|| g.generalfeedback.clone())
                .or_else(|| g.responsesummary.clone())
        })
        .unwrap_or_else(|| "No solution provided".to_string());

    let (question_text, question_type, additional_context) = match render {
        Some(render) => describe_render(render),
        None => (
            "Question text not found".to_string(),
            "Unknown".to_string(),
            String::new(),
        ),
    };

    FeedbackRequest {
        user_answers: result.answers.clone(),
        correct_answer,
        general_feedback: grade.and_then(|g| g.generalfeedback.clone()),
        question_name: title.to_string(),
        question_text,
        question_type,
        additional_context,
        score: result.outcome.score,
        max_score: result.outcome.max_score,
        is_correct: result.outcome.passed,
    }
}

/// Plain question text, input kind and notable content of a rendered question.
fn describe_render(render: &RenderResponse) -> (String, String, String) {
    let html = render.html_with_inputs();
    let text = strip_tags(&render.questionrender);
    let text: String = text.chars().take(500).collect();

    let question_type = if html.contains("type=\"checkbox\"") {
        "Multiple Selection"
    } else if html.contains("type=\"radio\"") {
        "Multiple Choice"
    } else if html.contains("type=\"text\"") || html.contains("<textarea") {
        "Text/Algebraic Input"
    } else {
        "Unknown"
    };

    let mut context = String::new();
    if text.contains("\\(") || text.contains("\\[") {
        context.push_str("Contains mathematical expressions.");
    }
    if html.contains("jxgbox") || html.contains("<svg") || !render.questionassets.is_empty() {
        if !context.is_empty() {
            context.push(' ');
        }
        context.push_str("Contains interactive graph or diagram.");
    }
    (text, question_type.to_string(), context)
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
