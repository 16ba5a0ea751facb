//! Scripted service doubles.
//!
//! Both services answer from per-role queues first and fall back to
//! plausible defaults, so a test only scripts the calls it cares about.

use super::fixtures;
use crate::core::{Passage, StageRole};
use crate::errors::{GenerationError, RetrievalError};
use crate::services::{Generation, GenerationRequest, GenerationService, RetrievalService, SearchFilters};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Result of one scripted retrieval call.
pub type RetrievalOutcome = Result<Vec<Passage>, RetrievalError>;

/// Result of one scripted generation call.
pub type GenerationOutcome = Result<Generation, GenerationError>;

/// Counts calls in flight and remembers the highest count seen.
#[derive(Debug, Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Leaves the count on drop, so timed-out calls are released too.
struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A recorded retrieval call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalCall {
    /// Calling stage.
    pub stage: StageRole,
    /// Search text.
    pub query: String,
    /// Passages requested.
    pub top_k: usize,
}

/// Retrieval double. Unscripted calls return three passages per role with
/// ids from [`fixtures::prefix`].
#[derive(Debug, Default)]
pub struct ScriptedRetrieval {
    scripted: Mutex<HashMap<StageRole, VecDeque<RetrievalOutcome>>>,
    defaults: HashMap<StageRole, Vec<Passage>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RetrievalCall>>,
    in_flight: InFlight,
}

impl ScriptedRetrieval {
    /// Creates a retrieval double with default answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the answer for every unscripted call from `role`.
    #[must_use]
    pub fn with_passages(mut self, role: StageRole, passages: Vec<Passage>) -> Self {
        self.defaults.insert(role, passages);
        self
    }

    /// Queues the answer for the next call from `role`.
    #[must_use]
    pub fn script(self, role: StageRole, outcome: RetrievalOutcome) -> Self {
        self.scripted.lock().entry(role).or_default().push_back(outcome);
        self
    }

    /// Delays every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RetrievalCall> {
        self.calls.lock().clone()
    }

    /// Most calls that were running at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak()
    }

    /// Number of calls made by `role`.
    #[must_use]
    pub fn calls_for(&self, role: StageRole) -> usize {
        self.calls.lock().iter().filter(|c| c.stage == role).count()
    }
}

#[async_trait]
impl RetrievalService for ScriptedRetrieval {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Passage>, RetrievalError> {
        self.calls.lock().push(RetrievalCall {
            stage: filters.stage,
            query: query.to_string(),
            top_k: filters.top_k,
        });
        let _guard = self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(&filters.stage)
            .and_then(VecDeque::pop_front);
        let mut passages = match scripted {
            Some(outcome) => outcome?,
            None => self
                .defaults
                .get(&filters.stage)
                .cloned()
                .unwrap_or_else(|| fixtures::passages(fixtures::prefix(filters.stage), 3)),
        };
        passages.truncate(filters.top_k);
        Ok(passages)
    }
}

/// Hook run when a role's generation call starts.
pub type CallHook = Arc<dyn Fn() + Send + Sync>;

/// Generation double. Unscripted calls answer with
/// [`fixtures::canned_text`] citing the passages listed in the prompt.
#[derive(Default)]
pub struct ScriptedGeneration {
    scripted: Mutex<HashMap<StageRole, VecDeque<GenerationOutcome>>>,
    hooks: HashMap<StageRole, CallHook>,
    hanging: HashSet<StageRole>,
    delay: Option<Duration>,
    requests: Mutex<Vec<GenerationRequest>>,
    in_flight: InFlight,
}

impl std::fmt::Debug for ScriptedGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedGeneration")
            .field("hanging", &self.hanging)
            .field("delay", &self.delay)
            .field("requests", &self.requests.lock().len())
            .field("peak_in_flight", &self.in_flight.peak())
            .finish_non_exhaustive()
    }
}

impl ScriptedGeneration {
    /// Creates a generation double with default answers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer for the next call from `role`.
    #[must_use]
    pub fn script(self, role: StageRole, outcome: GenerationOutcome) -> Self {
        self.scripted.lock().entry(role).or_default().push_back(outcome);
        self
    }

    /// Queues the same answer for the next `times` calls from `role`.
    #[must_use]
    pub fn script_times(self, role: StageRole, times: usize, outcome: &GenerationOutcome) -> Self {
        (0..times).fold(self, |this, _| this.script(role, outcome.clone()))
    }

    /// Runs `hook` whenever `role` calls the service.
    #[must_use]
    pub fn with_hook(mut self, role: StageRole, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.insert(role, Arc::new(hook));
        self
    }

    /// Makes calls from `role` never return.
    #[must_use]
    pub fn hang_on(mut self, role: StageRole) -> Self {
        self.hanging.insert(role);
        self
    }

    /// Delays every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All requests so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls made by `role`.
    #[must_use]
    pub fn calls_for(&self, role: StageRole) -> usize {
        self.requests.lock().iter().filter(|r| r.stage == role).count()
    }

    /// Most calls that were running at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak()
    }
}

/// Passage ids listed in the prompt's context block.
fn prompt_passage_ids(prompt: &str) -> Vec<String> {
    let Some((_, block)) = prompt.split_once("CONTEXT PASSAGES:") else {
        return Vec::new();
    };
    block
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix('[')?;
            let (id, _) = rest.split_once("] ")?;
            Some(id.to_string())
        })
        .collect()
}

#[async_trait]
impl GenerationService for ScriptedGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        self.requests.lock().push(request.clone());
        let _guard = self.in_flight.enter();

        if let Some(hook) = self.hooks.get(&request.stage) {
            hook();
        }
        if self.hanging.contains(&request.stage) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(outcome) => outcome,
            None => {
                let ids = prompt_passage_ids(&request.prompt.user);
                Ok(Generation::grounded(fixtures::canned_text(request.stage, &ids)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Prompt;

    fn request(stage: StageRole, user: &str) -> GenerationRequest {
        GenerationRequest {
            stage,
            model: "test".into(),
            prompt: Prompt {
                system: String::new(),
                user: user.into(),
            },
            temperature: 0.2,
            max_tokens: 64,
        }
    }

    #[tokio::test]
    async fn test_retrieval_scripted_then_default() {
        let retrieval = ScriptedRetrieval::new()
            .script(StageRole::Researcher, Err(RetrievalError::Unavailable("down".into())));
        let filters = SearchFilters::new(StageRole::Researcher, 2);

        assert!(retrieval.search("q", &filters).await.is_err());
        let passages = retrieval.search("q", &filters).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].passage_id, "r1");
        assert_eq!(retrieval.calls_for(StageRole::Researcher), 2);
    }

    #[tokio::test]
    async fn test_generation_cites_prompt_passages() {
        let generation = ScriptedGeneration::new();
        let out = generation
            .generate(&request(
                StageRole::Reviewer,
                "task\n- [not] a passage\nCONTEXT PASSAGES:\n[v1] paper-v1.pdf\nbody\n\n[v2] paper-v2.pdf\nbody",
            ))
            .await
            .unwrap();
        assert!(out.grounded);
        assert!(out.text.contains("[cite:v1]"));
        assert!(out.text.contains("[cite:v2]"));
        assert_eq!(generation.calls_for(StageRole::Reviewer), 1);
    }

    #[tokio::test]
    async fn test_generation_script_times() {
        let generation = ScriptedGeneration::new().script_times(
            StageRole::Formatter,
            2,
            &Err(GenerationError::Unavailable("503".into())),
        );
        let req = request(StageRole::Formatter, "");
        assert!(generation.generate(&req).await.is_err());
        assert!(generation.generate(&req).await.is_err());
        assert!(generation.generate(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_peak_in_flight_counts_overlapping_calls() {
        let retrieval = ScriptedRetrieval::new().with_delay(Duration::from_millis(20));
        let filters = SearchFilters::new(StageRole::Reviewer, 3);

        let (a, b) = tokio::join!(retrieval.search("a", &filters), retrieval.search("b", &filters));
        assert!(a.is_ok() && b.is_ok());
        retrieval.search("c", &filters).await.unwrap();

        assert_eq!(retrieval.peak_in_flight(), 2);
    }

    #[test]
    fn test_prompt_passage_ids() {
        assert!(prompt_passage_ids("no block").is_empty());
        assert_eq!(
            prompt_passage_ids("CONTEXT PASSAGES:\n[p1] a.pdf (page 2)\ntext"),
            vec!["p1"]
        );
    }
}
