//! Compile natural-language mail instructions into UI plans and run them
//!
//! The pipeline has two halves. The compiler turns an instruction plus a provider's
//! vocabulary into a [`Plan`] of abstract actions; the [`Executor`] resolves each
//! action against a live UI through a [`UiSession`], waits for it to become
//! interactable, acts, and lets the page settle before moving on.
//!
//! ```no_run
//! use courier::{Courier, TreeSession};
//! # async fn demo() -> Result<(), courier::CourierError> {
//! let courier = Courier::new();
//! let mut session = TreeSession::from_path("inbox.json")?;
//! let outcome = courier
//!     .compile_and_execute(
//!         "send email to joe@example.com about Meeting saying 'Hello from automation'",
//!         "gmail",
//!         &mut session,
//!     )
//!     .await?;
//! assert!(outcome.is_completed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub mod errors;
pub mod executor;
pub mod locator;
pub mod outcome;
pub mod parser;
pub mod plan;
pub mod selector;
pub mod session;
pub mod sessions;
#[cfg(test)]
mod tests;
pub mod vocabulary;

pub use errors::CourierError;
pub use executor::{Executor, ExecutorConfig, SettlePolicy};
pub use locator::Locator;
pub use outcome::{ActionOutcome, ActionReport, ActionState, ExecutionOutcome, RunFailure, RunStatus};
pub use parser::{InstructionParser, PatternParser, TaskRequest};
pub use plan::{compile, compile_for, AbstractAction, Plan, SnapshotWarning};
pub use selector::{ControlSelector, FieldSelector, Selector};
pub use session::{ElementHandle, UiSession};
pub use sessions::{SessionEvent, TreeSession, UiNode};
pub use vocabulary::{ProviderVocabulary, VocabularyTable};

/// The main entry point: vocabulary, parser and executor wired together.
#[derive(Clone)]
pub struct Courier {
    vocabulary: Arc<VocabularyTable>,
    parser: Arc<dyn InstructionParser>,
    executor: Executor,
}

impl Default for Courier {
    fn default() -> Self {
        Self::new()
    }
}

impl Courier {
    /// Built-in vocabulary, pattern parser, default executor settings.
    pub fn new() -> Self {
        Self {
            vocabulary: Arc::new(VocabularyTable::builtin()),
            parser: Arc::new(PatternParser),
            executor: Executor::default(),
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: Arc<VocabularyTable>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Swap in a different language-understanding component.
    pub fn with_parser(mut self, parser: Arc<dyn InstructionParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = Executor::new(config);
        self
    }

    pub fn vocabulary(&self) -> &VocabularyTable {
        &self.vocabulary
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Parse and compile without touching any UI.
    ///
    /// The provider is checked first, so an unsupported provider is reported even
    /// when the instruction is also malformed.
    #[instrument(skip(self, instruction))]
    pub fn compile(&self, instruction: &str, provider: &str) -> Result<Plan, CourierError> {
        let vocab = self.vocabulary.lookup(provider)?;
        let task = self.parser.parse(instruction)?;
        Ok(compile(&task, vocab))
    }

    /// Compile, then execute against `session`.
    ///
    /// `Err` is only returned for validation failures, before any interaction. A run
    /// that starts always yields an [`ExecutionOutcome`], failed or not.
    pub async fn compile_and_execute(
        &self,
        instruction: &str,
        provider: &str,
        session: &mut dyn UiSession,
    ) -> Result<ExecutionOutcome, CourierError> {
        self.compile_and_execute_with_cancel(instruction, provider, session, CancellationToken::new())
            .await
    }

    #[instrument(skip(self, instruction, session, cancel))]
    pub async fn compile_and_execute_with_cancel(
        &self,
        instruction: &str,
        provider: &str,
        session: &mut dyn UiSession,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, CourierError> {
        let plan = self.compile(instruction, provider)?;
        info!("Executing {} action(s) for {}", plan.len(), plan.provider);
        Ok(self
            .executor
            .execute_with_cancel(plan, session, cancel)
            .await)
    }
}
