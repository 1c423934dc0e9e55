//! Adaptive truncation: widen the criteria until the truncated estimate is
//! close enough to the exact reference.

use raptor_job_queue::{AdaptiveParams, JobStatus, TruncationCriteria};
use serde_json::Value;
use tracing::{debug, info};

use crate::engine::{EngineRun, QuantEngine};
use crate::error::JobError;

/// Final state of an adaptive run.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveOutcome {
    /// Last engine run.
    pub run: EngineRun,
    /// Criteria the last run used.
    pub criteria: TruncationCriteria,
    /// Products retained by the first run.
    pub original_products: u64,
    pub exact_probability: f64,
    pub relative_error: f64,
    /// Number of engine invocations.
    pub iterations: u32,
    pub converged: bool,
}

impl AdaptiveOutcome {
    /// COMPLETED when converged, PARTIAL when the iteration budget ran out.
    pub fn status(&self) -> JobStatus {
        if self.converged {
            JobStatus::Completed
        } else {
            JobStatus::Partial
        }
    }
}

/// `|exact - approximate| / exact`, 0 when both are 0.
pub fn relative_error(exact: f64, approximate: f64) -> f64 {
    let diff = (exact - approximate).abs();
    if diff == 0.0 {
        0.0
    } else if exact == 0.0 {
        f64::INFINITY
    } else {
        diff / exact.abs()
    }
}

fn measure(run: &EngineRun) -> Result<(f64, f64), JobError> {
    let exact = run.exact_probability.ok_or_else(|| {
        JobError::InvalidEngineOutput("adaptive run without exactProbability".into())
    })?;
    Ok((exact, relative_error(exact, run.probability)))
}

/// Run the adaptive loop for one request.
pub async fn run_adaptive(
    engine: &dyn QuantEngine,
    request: &Value,
    params: &AdaptiveParams,
) -> Result<AdaptiveOutcome, JobError> {
    let mut criteria = params.initial;
    let mut run = engine.quantify(request, Some(criteria)).await?;
    let original_products = run.products;
    let (mut exact, mut error) = measure(&run)?;
    let mut iterations = 1;

    while error > params.tolerance && iterations < params.max_iterations {
        criteria = criteria.widen(params.order_step, params.cut_off_factor);
        debug!(
            iterations,
            relative_error = error,
            limit_order = criteria.limit_order,
            cut_off = criteria.cut_off,
            "widening truncation"
        );
        run = engine.quantify(request, Some(criteria)).await?;
        (exact, error) = measure(&run)?;
        iterations += 1;
    }

    let converged = error <= params.tolerance;
    info!(iterations, relative_error = error, converged, "adaptive quantification finished");

    Ok(AdaptiveOutcome {
        run,
        criteria,
        original_products,
        exact_probability: exact,
        relative_error: error,
        iterations,
        converged,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use raptor_job_queue::async_trait;
    use serde_json::json;

    use super::*;

    /// Engine whose estimate approaches 0.01 as the limit order grows.
    pub(crate) struct ScriptedEngine {
        pub calls: Mutex<Vec<Option<TruncationCriteria>>>,
    }

    impl ScriptedEngine {
        pub(crate) fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuantEngine for ScriptedEngine {
        async fn quantify(
            &self,
            _request: &Value,
            criteria: Option<TruncationCriteria>,
        ) -> Result<EngineRun, JobError> {
            self.calls.lock().unwrap().push(criteria);
            let order = criteria.map_or(3, |c| c.limit_order);
            // Error halves with every extra order: 0.8, 0.4, 0.2, ...
            let missing = 0.8 / f64::from(1u32 << order.saturating_sub(3).min(30));
            Ok(EngineRun {
                probability: 0.01 * (1.0 - missing),
                products: u64::from(order) * 10,
                exact_probability: Some(0.01),
                analysis_seconds: Some(0.5),
                output: json!({ "limitOrder": order }),
            })
        }
    }

    fn params(tolerance: f64, max_iterations: u32) -> AdaptiveParams {
        AdaptiveParams {
            tolerance,
            max_iterations,
            ..AdaptiveParams::default()
        }
    }

    #[test]
    fn relative_error_edge_cases() {
        assert_eq!(relative_error(0.0, 0.0), 0.0);
        assert!((relative_error(0.5, 0.25) - 0.5).abs() < 1e-12);
        assert!(relative_error(0.0, 0.1).is_infinite());
    }

    #[tokio::test]
    async fn widens_until_tolerance_met() {
        let engine = ScriptedEngine::new();
        let outcome = run_adaptive(&engine, &json!({}), &params(0.15, 10))
            .await
            .unwrap();

        assert!(outcome.converged);
        assert_eq!(outcome.status(), JobStatus::Completed);
        // 0.8 -> 0.4 -> 0.2 -> 0.1
        assert_eq!(outcome.iterations, 4);
        assert_eq!(outcome.criteria.limit_order, 6);
        assert_eq!(outcome.original_products, 30);
        assert_eq!(outcome.run.products, 60);
        assert!((outcome.relative_error - 0.1).abs() < 1e-9);

        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let cut_offs: Vec<f64> = calls.iter().map(|c| c.unwrap().cut_off).collect();
        assert!(cut_offs.windows(2).all(|w| w[1] < w[0]));
    }

    #[tokio::test]
    async fn exhausted_budget_is_partial() {
        let engine = ScriptedEngine::new();
        let outcome = run_adaptive(&engine, &json!({}), &params(0.01, 2))
            .await
            .unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.status(), JobStatus::Partial);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.original_products, 30);
    }

    #[tokio::test]
    async fn first_run_within_tolerance_stops_immediately() {
        let engine = ScriptedEngine::new();
        let outcome = run_adaptive(&engine, &json!({}), &params(0.9, 5))
            .await
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.original_products, outcome.run.products);
    }
}
