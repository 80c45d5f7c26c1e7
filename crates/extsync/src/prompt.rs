//! Interactive decision prompt for failing extensions

use async_trait::async_trait;
use console::style;
use dialoguer::Select;
use extsync_core::retry::{InterventionDecision, InterventionHandler, RetryContext};
use extsync_core::OperationError;
use tokio::sync::Mutex;

const CHOICES: [(&str, InterventionDecision); 3] = [
    ("Retry", InterventionDecision::Retry),
    ("Skip this extension", InterventionDecision::Skip),
    ("Abort the whole update", InterventionDecision::Abort),
];

/// Asks on the terminal; workers needing an answer queue up behind one prompt
#[derive(Default)]
pub struct TerminalPrompt {
    turn: Mutex<()>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterventionHandler for TerminalPrompt {
    async fn decide(
        &self,
        label: &str,
        error: &OperationError,
        ctx: &RetryContext,
    ) -> InterventionDecision {
        let _turn = self.turn.lock().await;

        let prompt = format!(
            "{} failed after {} attempt(s): {}",
            style(label).bold(),
            ctx.attempt_count,
            error
        );

        let answer = tokio::task::spawn_blocking(move || {
            let items: Vec<&str> = CHOICES.iter().map(|(text, _)| *text).collect();
            Select::new()
                .with_prompt(prompt)
                .items(&items)
                .default(1)
                .interact_opt()
        })
        .await;

        match answer {
            Ok(Ok(Some(index))) => CHOICES
                .get(index)
                .map(|(_, decision)| *decision)
                .unwrap_or(InterventionDecision::Skip),
            // Esc, a closed terminal or a panicked prompt skip the item
            _ => InterventionDecision::Skip,
        }
    }
}
