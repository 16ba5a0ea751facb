//! Bounded fan-out retrieval for a stage's sub-queries.

use super::{QuerySpec, StagePorts, StageSettings, SubQuery};
use crate::core::{merge_passages, Passage, StageRole};
use crate::errors::{RetrievalError, StageError};
use crate::services::SearchFilters;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

/// Runs every sub-query with at most `settings.fan_out` in flight, each
/// under the per-call timeout, then merges the results with the carried
/// passages.
///
/// Results are collected in sub-query order, so the merged list does not
/// depend on completion order. The first failing sub-query fails the whole
/// retrieval.
///
/// # Errors
///
/// Returns [`StageError::Retrieval`] for the first sub-query that failed or
/// timed out.
pub async fn retrieve_passages(
    role: StageRole,
    spec: &QuerySpec,
    ports: &StagePorts,
    settings: &StageSettings,
) -> Result<Vec<Passage>, StageError> {
    let timeout = settings.per_call_timeout();
    let after_ms = settings.per_call_timeout_ms;

    let sub_queries: Vec<SubQuery> = spec
        .sub_queries
        .iter()
        .filter(|sq| sq.top_k > 0)
        .cloned()
        .collect();

    let fresh: Vec<Vec<Passage>> = stream::iter(sub_queries)
        .map(|sub_query| {
            let filters = SearchFilters::new(role, sub_query.top_k);
            let retrieval = ports.retrieval.clone();
            async move {
                match tokio::time::timeout(timeout, retrieval.search(&sub_query.query, &filters)).await {
                    Ok(result) => result,
                    Err(_) => Err(RetrievalError::Timeout { after_ms }),
                }
            }
        })
        .buffered(settings.fan_out.max(1))
        .try_collect()
        .await?;

    debug!(
        stage = %role,
        sub_queries = fresh.len(),
        carried = spec.carried.len(),
        "Retrieval fan-out finished"
    );

    Ok(merge_passages(
        fresh.into_iter().chain(std::iter::once(spec.carried.clone())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MockGenerationService, MockRetrievalService};
    use crate::testing::{ScriptedGeneration, ScriptedRetrieval};
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> StageSettings {
        StageSettings {
            model: "m".into(),
            temperature: 0.3,
            top_k: 5,
            max_tokens: 256,
            per_call_timeout_ms: 1_000,
            fan_out: 2,
        }
    }

    fn ports(retrieval: MockRetrievalService) -> StagePorts {
        StagePorts::new(Arc::new(retrieval), Arc::new(MockGenerationService::new()))
    }

    #[tokio::test]
    async fn test_merges_sub_queries_and_carried() {
        let mut retrieval = MockRetrievalService::new();
        retrieval.expect_search().returning(|query, _| {
            Ok(match query {
                "a" => vec![Passage::new("p1", "x", "s", 0.5), Passage::new("p2", "y", "s", 0.4)],
                _ => vec![Passage::new("p2", "y", "s", 0.7)],
            })
        });

        let spec = QuerySpec::new(vec![SubQuery::new("a", 5), SubQuery::new("b", 5)])
            .with_carried(vec![Passage::new("p0", "z", "s", 0.1)]);
        let passages = retrieve_passages(StageRole::Reviewer, &spec, &ports(retrieval), &settings())
            .await
            .unwrap();

        let ids: Vec<_> = passages.iter().map(|p| p.passage_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1", "p0"]);
    }

    #[tokio::test]
    async fn test_any_failure_fails_retrieval() {
        let mut retrieval = MockRetrievalService::new();
        retrieval.expect_search().returning(|query, _| {
            if query == "bad" {
                Err(RetrievalError::Unavailable("down".into()))
            } else {
                Ok(vec![])
            }
        });

        let spec = QuerySpec::new(vec![SubQuery::new("ok", 5), SubQuery::new("bad", 5)]);
        let err = retrieve_passages(StageRole::Researcher, &spec, &ports(retrieval), &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Retrieval(RetrievalError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fan_out_bounds_calls_in_flight() {
        let retrieval = Arc::new(ScriptedRetrieval::new().with_delay(Duration::from_millis(20)));
        let ports = StagePorts::new(retrieval.clone(), Arc::new(ScriptedGeneration::new()));
        let spec = QuerySpec::new(
            (0..6).map(|i| SubQuery::new(format!("angle {i}"), 3)).collect(),
        );

        let passages = retrieve_passages(StageRole::Reviewer, &spec, &ports, &settings())
            .await
            .unwrap();

        assert_eq!(retrieval.calls_for(StageRole::Reviewer), 6);
        assert_eq!(retrieval.peak_in_flight(), 2);
        assert_eq!(passages.len(), 3);
    }

    #[tokio::test]
    async fn test_slow_sub_query_times_out() {
        let retrieval = Arc::new(ScriptedRetrieval::new().with_delay(Duration::from_millis(500)));
        let ports = StagePorts::new(retrieval, Arc::new(ScriptedGeneration::new()));
        let settings = StageSettings {
            per_call_timeout_ms: 10,
            ..settings()
        };

        let spec = QuerySpec::new(vec![SubQuery::new("q", 3)]);
        let err = retrieve_passages(StageRole::Researcher, &spec, &ports, &settings)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::Retrieval(RetrievalError::Timeout { after_ms: 10 })
        ));
    }

    #[tokio::test]
    async fn test_zero_top_k_skips_service() {
        let mut retrieval = MockRetrievalService::new();
        retrieval.expect_search().never();

        let spec = QuerySpec::new(vec![SubQuery::new("q", 0)])
            .with_carried(vec![Passage::new("p1", "x", "s", 0.5)]);
        let passages = retrieve_passages(StageRole::Formatter, &spec, &ports(retrieval), &settings())
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
    }
}
