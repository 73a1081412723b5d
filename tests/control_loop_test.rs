//! Control loop scenarios against the scripted mock oracle.

mod common;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fixloop::adapters::oracles::{MockOracle, OracleSet};
use fixloop::domain::models::{ClusterMap, OracleKind, OwnershipConfig, RetestScope, Roster, ScenarioMode};
use fixloop::services::circuit_breaker::CircuitBreakerConfig;
use fixloop::services::context_truncation::TruncationConfig;
use fixloop::services::control_loop::{ControlLoop, LoopDependencies, LoopOutcome, LoopSettings, ESCALATION_FILE};
use fixloop::services::shared_files::OwnershipMap;
use fixloop::services::test_worker::WorkerSettings;
use fixloop::services::worker_pool::InProcessLauncher;
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{roster, scenario_of, scripted, scripted_reply, stores_with, Stores};

const LOOP_ID: &str = "nightly";

fn shop_roster() -> Roster {
    roster(3, vec![scripted("login", 2), scripted("checkout", 3), scripted("invoices", 2)])
}

fn clusters() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("auth".to_string(), vec!["login".to_string()]),
        ("payments".to_string(), vec!["checkout".to_string()]),
        ("billing".to_string(), vec!["invoices".to_string()]),
    ])
}

fn control_loop(stores: &Stores, oracle: &MockOracle, dir: &Path, max_iterations: u32) -> ControlLoop {
    let settings = LoopSettings {
        loop_id: LOOP_ID.to_string(),
        max_iterations,
        retest: RetestScope::Full,
        work_dir: dir.join("runs"),
        breaker: CircuitBreakerConfig::immediate(3, 10),
        fix_timeout: Duration::from_secs(10),
        truncation: TruncationConfig::default(),
    };
    let oracle: Arc<MockOracle> = Arc::new(oracle.clone());
    let deps = LoopDependencies {
        roster: stores.roster.clone(),
        results: stores.results.clone(),
        unfixable: stores.unfixable.clone(),
        metrics: stores.metrics.clone(),
        oracles: OracleSet::uniform(oracle.clone()),
        launcher: Arc::new(InProcessLauncher::new(
            oracle,
            stores.results.clone(),
            stores.roster.clone(),
            WorkerSettings::default(),
        )),
    };
    let ownership = OwnershipMap::from_config(&OwnershipConfig {
        root: dir.join("src").to_string_lossy().into_owned(),
        ..OwnershipConfig::default()
    });
    ControlLoop::new(settings, deps, 2, ClusterMap::from_clusters(&clusters()), ownership)
}

/// Diagnosis reply with one spec per diagnosed cluster.
fn diagnose_all(request: &Value, spec: impl Fn(&str) -> Value) -> String {
    let specs: Vec<Value> = request["clusters"]
        .as_object()
        .map(|c| c.keys().map(|k| spec(k)).collect())
        .unwrap_or_default();
    json!({ "fix_specs": specs, "summary": "diagnosed" }).to_string()
}

fn fixable(cluster: &str) -> Value {
    json!({
        "cluster": cluster,
        "diagnosis": format!("{cluster} handler rejects valid input"),
        "diagnosis_confidence": 0.8,
        "fixes": [{"file": format!("src/{cluster}.rs")}],
    })
}

#[tokio::test]
async fn test_loop_converges_after_fix() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let fixed = Arc::new(AtomicBool::new(false));

    let test_fixed = fixed.clone();
    let fix_flag = fixed.clone();
    let oracle = MockOracle::new("oracle")
        .with_handler(OracleKind::Test, move |req| {
            if scenario_of(req) == "checkout" && !test_fixed.load(Ordering::SeqCst) {
                let password = req["credentials"]["password"].as_str().unwrap_or_default();
                let reply = json!({"step_results": [
                    {"step_number": 1, "status": "pass"},
                    {"step_number": 2, "status": "pass"},
                    {"step_number": 3, "status": "fail", "failure_reason": format!("login as {password} rejected")},
                ]});
                Ok(reply.to_string())
            } else {
                Ok(scripted_reply(req, true))
            }
        })
        .with_handler(OracleKind::Diagnosis, |req| Ok(diagnose_all(req, fixable)))
        .with_handler(OracleKind::Fix, move |req| {
            fix_flag.store(true, Ordering::SeqCst);
            let cluster = req["fix_spec"]["cluster"].as_str().unwrap_or_default();
            Ok(json!({
                "cluster": cluster,
                "fixes_applied": [{"description": "validated card input"}],
                "shared_file_changes_needed": [],
                "fixes_skipped": []
            })
            .to_string())
        });

    let summary = control_loop(&stores, &oracle, dir.path(), 5).run().await.unwrap();

    assert_eq!(summary.outcome, LoopOutcome::Converged { iteration: 2 });
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.counts.pass, 9);
    assert_eq!(summary.missing_results, 0);

    let loop_dir = dir.path().join("runs").join(LOOP_ID);
    assert!(loop_dir.join("iteration-1.json").exists());
    assert!(loop_dir.join("iteration-2.json").exists());
    assert!(!loop_dir.join(ESCALATION_FILE).exists());

    let diagnosis = oracle.requests(OracleKind::Diagnosis);
    assert_eq!(diagnosis.len(), 1);
    let clusters = diagnosis[0]["clusters"].as_object().unwrap();
    assert_eq!(clusters.keys().collect::<Vec<_>>(), vec!["payments"]);
    assert_eq!(clusters["payments"].as_array().unwrap().len(), 3);
    assert!(
        !diagnosis[0].to_string().contains("pw-persona-"),
        "persona passwords never reach the diagnosis oracle"
    );

    let history = stores.metrics.history(LOOP_ID).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].pass_count, 6);
    assert_eq!(history[1].pass_count, 9);
    assert_eq!(oracle.calls(OracleKind::Fix), 1);
}

#[tokio::test]
async fn test_loop_halts_when_metrics_stall() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let oracle = MockOracle::new("oracle")
        .with_handler(OracleKind::Test, |req| Ok(scripted_reply(req, scenario_of(req) != "checkout")))
        .with_handler(OracleKind::Diagnosis, |req| Ok(diagnose_all(req, fixable)))
        .with_handler(OracleKind::Fix, |_| Ok(json!({
            "fixes_applied": [],
            "shared_file_changes_needed": [],
            "fixes_skipped": [],
            "notes": "could not reproduce"
        })
        .to_string()));

    let summary = control_loop(&stores, &oracle, dir.path(), 10).run().await.unwrap();

    assert_eq!(summary.outcome, LoopOutcome::Stalled { iteration: 3 });
    assert_eq!(summary.exit_code(), 2);
    assert_eq!(summary.counts.pass, 6);
    assert_eq!(summary.counts.partial + summary.counts.fail, 3);

    let escalation: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("runs").join(LOOP_ID).join(ESCALATION_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(escalation["outcome"], "stalled");
    assert_eq!(escalation["counts"]["pass"], 6);
    assert_eq!(oracle.calls(OracleKind::Fix), 2, "no fix stage in the stalled iteration");
}

#[tokio::test]
async fn test_loop_opens_circuit_on_repeated_diagnosis_failure() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let oracle = MockOracle::new("oracle")
        .with_handler(OracleKind::Test, |req| Ok(scripted_reply(req, scenario_of(req) != "invoices")))
        .with_handler(OracleKind::Diagnosis, |_| Ok("nonsense".to_string()));

    let summary = control_loop(&stores, &oracle, dir.path(), 10).run().await.unwrap();

    match &summary.outcome {
        LoopOutcome::CircuitOpen { iteration, signature } => {
            assert_eq!(*iteration, 1);
            assert_eq!(signature.len(), 64);
        }
        other => panic!("expected circuit open, got {other:?}"),
    }
    assert_eq!(summary.exit_code(), 3);
    assert!(summary.signature().is_some());
    assert_eq!(oracle.calls(OracleKind::Diagnosis), 3);
    assert_eq!(oracle.calls(OracleKind::Fix), 0);

    let escalation: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("runs").join(LOOP_ID).join(ESCALATION_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(escalation["signature"], summary.signature().unwrap());
}

#[tokio::test]
async fn test_loop_stops_when_only_human_review_remains() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let oracle = MockOracle::new("oracle")
        .with_handler(OracleKind::Test, |req| Ok(scripted_reply(req, scenario_of(req) != "invoices")))
        .with_handler(OracleKind::Diagnosis, |req| {
            Ok(diagnose_all(req, |c| {
                json!({"cluster": c, "diagnosis": "ambiguous requirement", "needs_interrogation": true})
            }))
        });

    let summary = control_loop(&stores, &oracle, dir.path(), 10).run().await.unwrap();

    assert_eq!(summary.outcome, LoopOutcome::NoFixableCandidates { iteration: 1 });
    assert_eq!(summary.exit_code(), 4);
    assert!(summary.needs_human.contains("billing"));
    assert_eq!(oracle.calls(OracleKind::Fix), 0);
}

#[tokio::test]
async fn test_unfixable_clusters_are_blacklisted_then_filtered() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let oracle = MockOracle::new("oracle")
        .with_handler(OracleKind::Test, |req| Ok(scripted_reply(req, scenario_of(req) != "invoices")))
        .with_handler(OracleKind::Diagnosis, |req| {
            Ok(diagnose_all(req, |c| {
                json!({"cluster": c, "diagnosis": "third-party PDF service is down", "unfixable": true})
            }))
        });

    let summary = control_loop(&stores, &oracle, dir.path(), 10).run().await.unwrap();

    assert_eq!(summary.outcome, LoopOutcome::NoFixableCandidates { iteration: 2 });
    assert_eq!(summary.unfixable_added, 1);
    assert!(stores.unfixable.contains("invoices", ScenarioMode::Scripted).await.unwrap());
    assert_eq!(oracle.calls(OracleKind::Diagnosis), 1, "filtered failures never reach diagnosis again");

    let items = stores.unfixable.list().await.unwrap();
    assert_eq!(items[0].reason, "third-party PDF service is down");
}

#[tokio::test]
async fn test_iteration_limit() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let oracle = MockOracle::new("oracle")
        .with_handler(OracleKind::Test, |req| Ok(scripted_reply(req, scenario_of(req) != "login")));

    let summary = control_loop(&stores, &oracle, dir.path(), 1).run().await.unwrap();

    assert_eq!(summary.outcome, LoopOutcome::IterationLimit { iteration: 1 });
    assert_eq!(summary.exit_code(), 5);
    assert_eq!(oracle.calls(OracleKind::Diagnosis), 0);
}

#[tokio::test]
async fn test_rerun_of_same_loop_reuses_recorded_results() {
    let stores = stores_with(&shop_roster()).await;
    let dir = TempDir::new().unwrap();
    let oracle = MockOracle::new("oracle").with_handler(OracleKind::Test, |req| Ok(scripted_reply(req, true)));

    let first = control_loop(&stores, &oracle, dir.path(), 3).run().await.unwrap();
    assert_eq!(first.outcome, LoopOutcome::Converged { iteration: 1 });
    assert_eq!(oracle.calls(OracleKind::Test), 9);

    let second = control_loop(&stores, &oracle, dir.path(), 3).run().await.unwrap();
    assert_eq!(second.outcome, LoopOutcome::Converged { iteration: 1 });
    assert_eq!(oracle.calls(OracleKind::Test), 9, "resumed iteration reuses every row");
    assert_eq!(stores.metrics.history(LOOP_ID).await.unwrap().len(), 1);
}
