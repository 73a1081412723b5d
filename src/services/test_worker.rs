//! Test worker: runs one batch of test pairs against the test oracle.
//!
//! A worker owns no state beyond its batch. Results go straight to the store
//! under the (run, persona, scenario, mode) key, which makes a re-run of the
//! same batch skip every pair that already has a row.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, Instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ExploratoryResponse, InstanceKey, OracleKind, Persona, Scenario, ScenarioMode,
    ScriptedResponse, StepDetail, TestInstance, TestOracleRequest, TestPair, WorkerConfig, WorkerOutcome,
};
use crate::domain::ports::{Oracle, ResultRepository, RosterRepository};
use crate::services::oracle_calls::call_typed;

/// Actions allowed per step, including slack for login and navigation.
const ACTIONS_PER_STEP: f64 = 5.5;

/// Steps added to every scenario for login and landing.
const OVERHEAD_STEPS: f64 = 2.0;

/// Browser-level action budget for a scenario of `steps` steps.
pub fn action_budget(steps: u32) -> u32 {
    ((f64::from(steps) + OVERHEAD_STEPS) * ACTIONS_PER_STEP).ceil() as u32
}

/// Per-worker settings taken from the `workers` configuration section.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_attempts: u32,
    pub exploratory_step_estimate: u32,
    pub target: String,
    pub artifact_dir: String,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            exploratory_step_estimate: config.exploratory_step_estimate,
            target: config.target.clone(),
            artifact_dir: config.artifact_dir.clone(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

pub struct TestWorker {
    index: usize,
    run_id: String,
    oracle: Arc<dyn Oracle>,
    results: Arc<dyn ResultRepository>,
    roster: Arc<dyn RosterRepository>,
    settings: WorkerSettings,
}

impl TestWorker {
    pub fn new(
        index: usize,
        run_id: impl Into<String>,
        oracle: Arc<dyn Oracle>,
        results: Arc<dyn ResultRepository>,
        roster: Arc<dyn RosterRepository>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            index,
            run_id: run_id.into(),
            oracle,
            results,
            roster,
            settings,
        }
    }

    /// Run every pair of `batch` in order and tally the outcome.
    ///
    /// Only a failure to read the roster aborts the batch. Oracle failures
    /// become `error` instances, and store failures are counted per pair.
    #[instrument(skip(self, batch), fields(run_id = %self.run_id, worker = self.index, pairs = batch.len()))]
    pub async fn run_batch(&self, batch: &[TestPair]) -> DomainResult<WorkerOutcome> {
        let mut outcome = WorkerOutcome::new(self.index, &self.run_id);
        let roster = self.roster.load().await?;
        let personas: HashMap<&str, &Persona> = roster.personas.iter().map(|p| (p.id.as_str(), p)).collect();
        let scenarios: HashMap<&str, &Scenario> = roster.scenarios.iter().map(|s| (s.id.as_str(), s)).collect();

        for pair in batch {
            let key = InstanceKey::new(&self.run_id, pair);
            let span = tracing::info_span!("pair", pair = %pair);

            async {
                match self.results.get_instance(&key).await {
                    Ok(Some(existing)) => {
                        tracing::debug!(status = %existing.status, "Reusing recorded result");
                        outcome.reused += 1;
                        outcome.counts.record(existing.status);
                        return;
                    }
                    Ok(None) => {}
                    // The insert below is write-once, so running the pair is safe.
                    Err(e) => {
                        tracing::warn!(error = %e, "Lookup of recorded result failed; running the pair");
                        outcome.persistence_failures += 1;
                    }
                }

                let persona = personas.get(pair.persona_id.as_str()).copied();
                let scenario = scenarios.get(pair.scenario_id.as_str()).copied();
                let (instance, details) = self.execute(key, persona, scenario).await;
                outcome.executed += 1;

                match self.results.insert_instance(&instance, &details).await {
                    Ok(true) => outcome.counts.record(instance.status),
                    Ok(false) => {
                        // Another writer recorded this key first; its row is the result.
                        let status = match self.results.get_instance(&instance.key).await {
                            Ok(row) => row.map_or(instance.status, |row| row.status),
                            Err(e) => {
                                tracing::warn!(error = %e, "Could not read the row recorded by another writer");
                                outcome.persistence_failures += 1;
                                instance.status
                            }
                        };
                        outcome.reused += 1;
                        outcome.counts.record(status);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to persist test instance");
                        outcome.persistence_failures += 1;
                        outcome.counts.record(instance.status);
                    }
                }

                if let Err(e) = self.oracle.reset_session().await {
                    tracing::warn!(error = %e, "Session reset failed");
                }
            }
            .instrument(span)
            .await;
        }

        outcome.finished_at = Utc::now();
        tracing::info!(
            pass = outcome.counts.pass,
            fail = outcome.counts.fail,
            partial = outcome.counts.partial,
            error = outcome.counts.error,
            reused = outcome.reused,
            "Batch complete"
        );
        Ok(outcome)
    }

    async fn execute(
        &self,
        key: InstanceKey,
        persona: Option<&Persona>,
        scenario: Option<&Scenario>,
    ) -> (TestInstance, Vec<StepDetail>) {
        let started_at = Utc::now();
        let (persona, scenario) = match (persona, scenario) {
            (Some(p), Some(s)) => (p, s),
            (None, _) => {
                let msg = DomainError::PersonaNotFound(key.persona_id.clone()).to_string();
                return (TestInstance::errored(key, msg, started_at), Vec::new());
            }
            (_, None) => {
                let msg = DomainError::ScenarioNotFound(key.scenario_id.clone()).to_string();
                return (TestInstance::errored(key, msg, started_at), Vec::new());
            }
        };

        let steps = scenario
            .step_count()
            .map_or(self.settings.exploratory_step_estimate, |n| n as u32);
        let request = TestOracleRequest {
            target: self.settings.target.clone(),
            persona_id: persona.id.clone(),
            credentials: persona.credentials.clone(),
            scenario_id: scenario.id.clone(),
            mode: key.mode,
            steps: scenario.steps.clone(),
            goal: scenario.goal.clone(),
            artifact_dir: format!(
                "{}/{}/{}-{}-{}",
                self.settings.artifact_dir, key.run_id, key.persona_id, key.scenario_id, key.mode
            ),
            action_budget: action_budget(steps),
        };

        let attempts = self.settings.max_attempts;
        let parsed = match key.mode {
            ScenarioMode::Scripted => {
                call_typed::<_, ScriptedResponse>(self.oracle.as_ref(), OracleKind::Test, &request, attempts)
                    .await
                    .map(|r| {
                        let details: Vec<StepDetail> =
                            r.step_results.into_iter().map(StepDetail::Scripted).collect();
                        (details, None)
                    })
            }
            ScenarioMode::Exploratory => {
                call_typed::<_, ExploratoryResponse>(self.oracle.as_ref(), OracleKind::Test, &request, attempts)
                    .await
                    .map(|r| {
                        let score = r.mean_score();
                        let details: Vec<StepDetail> =
                            r.discovered_steps.into_iter().map(StepDetail::Exploratory).collect();
                        (details, score)
                    })
            }
        };

        match parsed {
            Ok((details, score)) => {
                let instance = TestInstance::from_details(key, &details, score, started_at);
                (instance, details)
            }
            Err(e) => {
                tracing::warn!(classification = e.classification(), error = %e, "Test oracle gave no usable result");
                (TestInstance::errored(key, e.to_string(), started_at), Vec::new())
            }
        }
    }
}
