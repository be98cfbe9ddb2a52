//! Batch loading through the planner and the wave executor

mod module;

use module::test_utils::*;
use modgate::config::LoadScope;
use modgate::module::{ModuleError, ModuleState};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn waves(report: &modgate::LoadReport) -> Vec<Vec<&str>> {
    report
        .waves
        .iter()
        .map(|w| w.iter().map(String::as_str).collect())
        .collect()
}

#[tokio::test]
async fn test_logging_cache_report_scenario() {
    let fixture = LoaderFixture::new();
    fixture.write_module("logging", &[]);
    fixture.write_module("cache", &["logging"]);
    fixture.write_module("report", &["cache", "logging"]);

    let runner = MockRunner::new().failing(&["cache"]).shared();
    let manager = fixture.manager(runner.clone());

    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(waves(&report), vec![vec!["logging"], vec!["cache"], vec!["report"]]);
    assert_eq!(report.state_of("logging"), Some(ModuleState::Loaded));
    assert_eq!(report.state_of("cache"), Some(ModuleState::Failed));
    assert_eq!(report.state_of("report"), Some(ModuleState::Skipped));
    assert_eq!(
        report.states["report"].detail,
        Some(ModuleError::DependencyFailed {
            module: "report".to_string(),
            dependency: "cache".to_string(),
        })
    );
    assert_eq!(runner.run_count("report"), 0);
    assert!(!report.all_loaded());
}

#[tokio::test]
async fn test_diamond_waves() {
    let fixture = LoaderFixture::new();
    // Names chosen so discovery order differs from dependency order
    fixture.write_module("d-top", &["b-left", "c-right"]);
    fixture.write_module("c-right", &["z-base"]);
    fixture.write_module("b-left", &["z-base"]);
    fixture.write_module("z-base", &[]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(
        waves(&report),
        vec![vec!["z-base"], vec!["b-left", "c-right"], vec!["d-top"]]
    );
    assert!(report.all_loaded());

    let base = runner.position("z-base").unwrap();
    let top = runner.position("d-top").unwrap();
    assert!(base < runner.position("b-left").unwrap());
    assert!(base < runner.position("c-right").unwrap());
    assert!(top > runner.position("b-left").unwrap());
    assert!(top > runner.position("c-right").unwrap());
}

#[tokio::test]
async fn test_concurrency_bound() {
    let mut fixture = LoaderFixture::new();
    fixture.config.max_concurrency = 2;
    for name in ["m1", "m2", "m3", "m4", "m5"] {
        fixture.write_module(name, &[]);
    }

    let delay = Duration::from_millis(100);
    let runner = MockRunner::new().with_delay(delay).shared();
    let manager = fixture.manager(runner.clone());

    let started = Instant::now();
    let report = manager.load_all(CancellationToken::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.waves.len(), 1);
    assert!(report.all_loaded());
    assert!(runner.peak_concurrency() <= 2);
    assert_eq!(runner.peak_concurrency(), 2);
    // ceil(5 / 2) delay units
    assert!(elapsed >= delay * 3, "finished in {:?}", elapsed);
}

#[tokio::test]
async fn test_serial_execution_with_one_slot() {
    let mut fixture = LoaderFixture::new();
    fixture.config.max_concurrency = 1;
    for name in ["a", "b", "c"] {
        fixture.write_module(name, &[]);
    }

    let runner = MockRunner::new()
        .with_delay(Duration::from_millis(20))
        .shared();
    let manager = fixture.manager(runner.clone());
    manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(runner.peak_concurrency(), 1);
    assert_eq!(runner.runs().len(), 3);
}

#[tokio::test]
async fn test_cycle_fails_members_and_spares_others() {
    let fixture = LoaderFixture::new();
    fixture.write_module("alpha", &["beta"]);
    fixture.write_module("beta", &["alpha"]);
    fixture.write_module("gamma", &[]);
    fixture.write_module("delta", &["alpha"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(report.cyclic, vec!["alpha", "beta", "delta"]);
    for name in ["alpha", "beta"] {
        assert_eq!(report.state_of(name), Some(ModuleState::Failed));
        match &report.states[name].detail {
            Some(ModuleError::CyclicDependency(members)) => {
                assert!(members.contains(&"alpha".to_string()));
                assert!(members.contains(&"beta".to_string()));
            }
            other => panic!("unexpected detail for {name}: {other:?}"),
        }
    }

    // Depends on the cycle without being part of it
    assert_eq!(report.state_of("delta"), Some(ModuleState::Skipped));
    assert_eq!(
        report.states["delta"].detail,
        Some(ModuleError::DependencyFailed {
            module: "delta".to_string(),
            dependency: "alpha".to_string(),
        })
    );

    assert_eq!(report.state_of("gamma"), Some(ModuleState::Loaded));
    assert_eq!(runner.runs(), vec!["gamma"]);
}

#[tokio::test]
async fn test_no_module_left_unloaded() {
    let fixture = LoaderFixture::new();
    fixture.write_module("base", &[]);
    fixture.write_module("mid", &["base"]);
    fixture.write_module("leaf", &["mid"]);
    fixture.write_module("other", &[]);
    fixture.write_module("other-leaf", &["other"]);

    let runner = MockRunner::new().failing(&["base"]).shared();
    let manager = fixture.manager(runner);
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(report.states.len(), 5);
    for entry in report.states.values() {
        assert!(entry.state.is_terminal());
    }
    assert_eq!(report.state_of("mid"), Some(ModuleState::Skipped));
    assert_eq!(report.state_of("leaf"), Some(ModuleState::Skipped));
    assert_eq!(
        report.states["leaf"].detail,
        Some(ModuleError::DependencyFailed {
            module: "leaf".to_string(),
            dependency: "base".to_string(),
        })
    );
    assert_eq!(report.state_of("other-leaf"), Some(ModuleState::Loaded));
}

#[cfg(unix)]
#[tokio::test]
async fn test_rejected_module_skips_dependents() {
    let fixture = LoaderFixture::new();
    let path = fixture.write_module("shared", &[]);
    set_mode(&path, 0o666);
    fixture.write_module("user", &["shared"]);
    fixture.write_module("standalone", &[]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(report.state_of("shared"), Some(ModuleState::Rejected));
    assert_eq!(report.state_of("user"), Some(ModuleState::Skipped));
    assert_eq!(report.state_of("standalone"), Some(ModuleState::Loaded));
    assert_eq!(runner.runs(), vec!["standalone"]);
}

#[tokio::test]
async fn test_missing_dependency_in_batch() {
    let fixture = LoaderFixture::new();
    fixture.write_module("git", &["vcs-core"]);
    fixture.write_module("git-prompt", &["git"]);
    fixture.write_module("clock", &[]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(report.state_of("git"), Some(ModuleState::Failed));
    assert_eq!(
        report.states["git"].detail,
        Some(ModuleError::MissingDependency {
            module: "git".to_string(),
            dependency: "vcs-core".to_string(),
        })
    );
    assert_eq!(report.state_of("git-prompt"), Some(ModuleState::Skipped));
    assert_eq!(report.state_of("clock"), Some(ModuleState::Loaded));
    assert_eq!(runner.runs(), vec!["clock"]);
}

#[tokio::test]
async fn test_cancellation_skips_unstarted_modules() {
    let mut fixture = LoaderFixture::new();
    fixture.config.max_concurrency = 1;
    fixture.write_module("first", &[]);
    fixture.write_module("second", &["first"]);
    fixture.write_module("third", &["second"]);

    let cancel = CancellationToken::new();
    let runner = MockRunner::new()
        .with_delay(Duration::from_millis(20))
        .cancel_when("first", cancel.clone())
        .shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(cancel).await.unwrap();

    assert!(report.cancelled);
    // In-flight module finishes
    assert_eq!(report.state_of("first"), Some(ModuleState::Loaded));
    for name in ["second", "third"] {
        assert_eq!(report.state_of(name), Some(ModuleState::Skipped));
        assert_eq!(
            report.states[name].detail,
            Some(ModuleError::Cancelled(name.to_string()))
        );
    }
    assert_eq!(runner.runs(), vec!["first"]);
}

#[tokio::test]
async fn test_cancellation_within_a_wave() {
    let mut fixture = LoaderFixture::new();
    fixture.config.max_concurrency = 1;
    fixture.write_module("a", &[]);
    fixture.write_module("b", &[]);
    fixture.write_module("c", &[]);

    let cancel = CancellationToken::new();
    let runner = MockRunner::new()
        .with_delay(Duration::from_millis(20))
        .cancel_on_first_run(cancel.clone())
        .shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(runner.runs().len(), 1);
    assert_eq!(report.with_state(ModuleState::Loaded).len(), 1);
    assert_eq!(report.with_state(ModuleState::Skipped).len(), 2);
}

#[tokio::test]
async fn test_enabled_scope_loads_closure_only() {
    let mut fixture = LoaderFixture::new();
    fixture.config.load_scope = LoadScope::Enabled;
    fixture.write_module("logging", &[]);
    fixture.write_module("cache", &["logging"]);
    fixture.write_module("unrelated", &[]);
    std::fs::write(
        &fixture.config.enabled_list_path,
        "# enabled modules\ncache\nghost\n",
    )
    .unwrap();

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert_eq!(report.unknown_enabled, vec!["ghost"]);
    assert_eq!(report.order, vec!["logging", "cache"]);
    assert!(report.states.get("unrelated").is_none());
    assert_eq!(runner.runs(), vec!["logging", "cache"]);
}

#[tokio::test]
async fn test_batch_rerun_starts_fresh() {
    let fixture = LoaderFixture::new();
    fixture.write_module("prompt", &[]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());
    manager.load_all(CancellationToken::new()).await.unwrap();
    let report = manager.load_all(CancellationToken::new()).await.unwrap();

    assert!(report.all_loaded());
    assert_eq!(runner.run_count("prompt"), 2);
}
