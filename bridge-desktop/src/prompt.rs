//! Policy-driven confirmation prompt

use async_trait::async_trait;
use bridge_traits::prompt::UserPrompt;
use tracing::info;

/// Answers every confirmation with the same value.
///
/// Useful for headless hosts (`FixedAnswerPrompt::deny()` keeps destructive
/// operations disabled) and for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswerPrompt {
    answer: bool,
}

impl FixedAnswerPrompt {
    pub fn accept() -> Self {
        Self { answer: true }
    }

    pub fn deny() -> Self {
        Self { answer: false }
    }
}

#[async_trait]
impl UserPrompt for FixedAnswerPrompt {
    async fn confirm(&self, message: &str) -> bool {
        info!(answer = self.answer, prompt = message, "Answering confirmation by policy");
        self.answer
    }
}
