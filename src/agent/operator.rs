use std::io::{BufRead, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

/// The human on the other side: confirms gated actions and answers when
/// the engine escalates.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Explicit yes/no before a destructive action runs.
    async fn confirm(&self, description: &str) -> bool;

    /// Free-form guidance after autonomous progress stopped.
    async fn request_guidance(&self, question: &str) -> Option<String>;
}

/// Prompts on the terminal. Reads stdin on a blocking thread.
#[derive(Debug, Default)]
pub struct ConsoleOperator;

#[async_trait]
impl Operator for ConsoleOperator {
    async fn confirm(&self, description: &str) -> bool {
        let prompt = format!(
            "\n\u{26a0} Safety check: the agent wants to interact with: {description}\nAllow this action? [y/N] "
        );
        match prompt_line(prompt).await {
            Some(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }

    async fn request_guidance(&self, question: &str) -> Option<String> {
        let prompt = format!("\nAgent needs help: {question}\nYour answer (empty to stop): ");
        prompt_line(prompt)
            .await
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
    }
}

async fn prompt_line(prompt: String) -> Option<String> {
    let read = tokio::task::spawn_blocking(move || {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(prompt.as_bytes());
        let _ = stdout.flush();

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await;

    match read {
        Ok(Ok(line)) => Some(line),
        Ok(Err(e)) => {
            warn!(error = %e, "could not read operator input");
            None
        }
        Err(e) => {
            warn!(error = %e, "operator prompt task failed");
            None
        }
    }
}

/// Fixed answers for unattended runs and tests. Records every prompt.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    approve: bool,
    guidance: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn approving() -> Self {
        Self {
            approve: true,
            ..Self::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn confirm(&self, description: &str) -> bool {
        self.record(description);
        self.approve
    }

    async fn request_guidance(&self, question: &str) -> Option<String> {
        self.record(question);
        self.guidance.clone()
    }
}
