use quiz_core::NavigationController;

/// Presentation snapshot of a practice session's navigation bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeView {
    pub current_index: usize,
    pub total: usize,
    pub title: String,
    pub forward_allowed: bool,
    pub backward_allowed: bool,
    pub previous_title: Option<String>,
    pub next_title: Option<String>,
    /// `next_title` is a remediation or repeat target.
    pub next_adaptive: bool,
    pub adaptive: bool,
    pub attempted: usize,
    pub passed: usize,
}

impl PracticeView {
    #[must_use]
    pub fn from_controller(controller: &NavigationController) -> Self {
        let progress = controller.progress();
        Self {
            current_index: controller.current_index(),
            total: controller.sequence().len(),
            title: controller
                .current()
                .map(|q| q.title().to_string())
                .unwrap_or_default(),
            forward_allowed: controller.is_forward_allowed(),
            backward_allowed: controller.is_backward_allowed(),
            previous_title: controller.previous_title().map(str::to_string),
            next_title: controller.next_title().map(str::to_string),
            next_adaptive: controller.is_next_adaptive(),
            adaptive: controller.is_adaptive(),
            attempted: progress.attempted_count(),
            passed: progress.passed_count(),
        }
    }

    /// Label of the forward button; locked questions carry a padlock.
    #[must_use]
    pub fn next_label(&self) -> String {
        match &self.next_title {
            Some(title) if self.forward_allowed => format!("{title} →"),
            Some(title) => format!("🔒 {title} →"),
            None => "Next →".to_string(),
        }
    }

    #[must_use]
    pub fn previous_label(&self) -> String {
        match &self.previous_title {
            Some(title) => format!("← {title}"),
            None => "← Previous".to_string(),
        }
    }

    /// One-based position, e.g. `3/7`.
    #[must_use]
    pub fn position(&self) -> String {
        format!("{}/{}", self.current_index + 1, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{Difficulty, QuestionDraft, QuestionSequence};
    use quiz_core::time::fixed_now;

    fn controller() -> NavigationController {
        NavigationController::new(
            QuestionSequence::from_drafts([
                QuestionDraft::new("Intro", "a.xml"),
                QuestionDraft::new("Matrices", "b.xml"),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn locked_next_label_until_attempted() {
        let mut controller = controller();
        let view = PracticeView::from_controller(&controller);
        assert_eq!(view.next_label(), "🔒 Matrices →");
        assert_eq!(view.previous_label(), "← Previous");
        assert_eq!(view.position(), "1/2");

        controller.record_attempt(true, 1.0, fixed_now()).unwrap();
        let view = PracticeView::from_controller(&controller);
        assert_eq!(view.next_label(), "Matrices →");
        assert_eq!(view.attempted, 1);
        assert_eq!(view.passed, 1);
    }

    #[test]
    fn next_label_follows_remediation() {
        let mut controller = NavigationController::new(
            QuestionSequence::from_drafts([
                QuestionDraft::new("Factorise", "a.xml").topic("algebra"),
                QuestionDraft::new("Matrix product", "b.xml").topic("matrices"),
                QuestionDraft::new("Expand brackets", "a.xml")
                    .topic("algebra")
                    .difficulty(Difficulty::Basic),
            ])
            .unwrap(),
        );
        controller.record_attempt(false, 0.0, fixed_now()).unwrap();
        let view = PracticeView::from_controller(&controller);
        assert_eq!(view.next_label(), "Expand brackets →");
        assert!(view.next_adaptive);
        assert!(!view.adaptive);
    }

    #[test]
    fn last_question_uses_generic_labels() {
        let mut controller = controller();
        controller.jump_to(1).unwrap();
        let view = PracticeView::from_controller(&controller);
        assert_eq!(view.title, "Matrices");
        assert_eq!(view.next_label(), "Next →");
        assert_eq!(view.previous_label(), "← Intro");
        assert!(!view.forward_allowed);
    }
}
