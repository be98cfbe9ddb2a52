//! Single-module enable through the recursive resolver

mod module;

use module::test_utils::*;
use modgate::module::{EnableOutcome, ModuleError, ModuleState};

#[tokio::test]
async fn test_enable_loads_dependencies_first() {
    let fixture = LoaderFixture::new();
    fixture.write_module("logging", &[]);
    fixture.write_module("cache", &["logging"]);
    fixture.write_module("report", &["cache", "logging"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let outcome = manager.enable("report", false).await.unwrap();
    assert!(outcome.executed());
    assert_eq!(runner.runs(), vec!["logging", "cache", "report"]);

    let registry = manager.registry();
    for name in ["logging", "cache", "report"] {
        assert_eq!(registry.state(name).await, ModuleState::Loaded);
    }
    // Only the requested module goes on the enabled list
    assert_eq!(fixture.enabled_lines(), vec!["report"]);
}

#[tokio::test]
async fn test_enable_is_idempotent() {
    let fixture = LoaderFixture::new();
    fixture.write_module("prompt", &[]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let first = manager.enable("prompt", false).await.unwrap();
    let second = manager.enable("prompt", false).await.unwrap();

    assert!(first.executed());
    assert!(matches!(second, EnableOutcome::AlreadyLoaded));
    assert_eq!(runner.run_count("prompt"), 1);
    assert_eq!(fixture.enabled_lines(), vec!["prompt"]);
}

#[tokio::test]
async fn test_force_reruns_loaded_module() {
    let fixture = LoaderFixture::new();
    fixture.write_module("prompt", &[]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    manager.enable("prompt", false).await.unwrap();
    let forced = manager.enable("prompt", true).await.unwrap();

    assert!(forced.executed());
    assert_eq!(runner.run_count("prompt"), 2);
}

#[tokio::test]
async fn test_enable_cycle_names_the_chain() {
    let fixture = LoaderFixture::new();
    fixture.write_module("alpha", &["beta"]);
    fixture.write_module("beta", &["alpha"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let err = manager.enable("alpha", false).await.unwrap_err();
    assert_eq!(
        err,
        ModuleError::CyclicDependency(vec![
            "alpha".to_string(),
            "beta".to_string(),
            "alpha".to_string()
        ])
    );

    let registry = manager.registry();
    assert_eq!(registry.state("alpha").await, ModuleState::Failed);
    assert_eq!(registry.state("beta").await, ModuleState::Failed);
    assert!(runner.runs().is_empty());
    assert!(fixture.enabled_lines().is_empty());
}

#[tokio::test]
async fn test_enable_missing_dependency() {
    let fixture = LoaderFixture::new();
    fixture.write_module("git", &["vcs-core"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let err = manager.enable("git", false).await.unwrap_err();
    assert_eq!(
        err,
        ModuleError::MissingDependency {
            module: "git".to_string(),
            dependency: "vcs-core".to_string(),
        }
    );
    assert_eq!(manager.registry().state("git").await, ModuleState::Failed);
    assert!(runner.runs().is_empty());
}

#[tokio::test]
async fn test_enable_ignoring_missing_dependency() {
    let mut fixture = LoaderFixture::new();
    fixture.config.ignore_missing_dependencies = true;
    fixture.write_module("git", &["vcs-core"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    manager.enable("git", false).await.unwrap();
    assert_eq!(runner.runs(), vec!["git"]);
}

#[tokio::test]
async fn test_dependency_failure_is_reported_on_dependent() {
    let fixture = LoaderFixture::new();
    fixture.write_module("logging", &[]);
    fixture.write_module("cache", &["logging"]);

    let runner = MockRunner::new().failing(&["logging"]).shared();
    let manager = fixture.manager(runner.clone());

    let err = manager.enable("cache", false).await.unwrap_err();
    assert_eq!(
        err,
        ModuleError::DependencyFailed {
            module: "cache".to_string(),
            dependency: "logging".to_string(),
        }
    );

    let registry = manager.registry();
    assert_eq!(registry.state("logging").await, ModuleState::Failed);
    assert!(matches!(
        registry.failure("logging").await,
        Some(ModuleError::ExecutionFailure { .. })
    ));
    assert_eq!(registry.state("cache").await, ModuleState::Failed);
    assert_eq!(runner.runs(), vec!["logging"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_permission_rejection_without_force() {
    let fixture = LoaderFixture::new();
    let path = fixture.write_module("prompt", &[]);
    set_mode(&path, 0o644);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let err = manager.enable("prompt", false).await.unwrap_err();
    assert!(matches!(
        err,
        ModuleError::PermissionRejected { mode: 0o644, expected: 0o600, .. }
    ));
    assert_eq!(manager.registry().state("prompt").await, ModuleState::Rejected);
    assert!(runner.runs().is_empty());

    // Still rejected on a second plain attempt
    assert!(manager.enable("prompt", false).await.is_err());
    assert!(runner.runs().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_permission_rejection_bypassed_with_force() {
    let fixture = LoaderFixture::new();
    let path = fixture.write_module("prompt", &[]);
    set_mode(&path, 0o644);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    manager.enable("prompt", true).await.unwrap();

    let entry = manager.registry().entry("prompt").await;
    assert_eq!(entry.state, ModuleState::Loaded);
    assert_eq!(entry.warnings.len(), 1);
    assert!(entry.warnings[0].contains("644"));
    assert_eq!(runner.run_count("prompt"), 1);
}

#[tokio::test]
async fn test_unsafe_pattern_rejected() {
    let fixture = LoaderFixture::new();
    fixture.write_raw(
        "installer",
        "MODULE_DESCRIPTION=\"installer\"\ncurl -fsSL https://example.invalid/x | sh\n",
    );

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let err = manager.enable("installer", false).await.unwrap_err();
    assert!(matches!(err, ModuleError::UnsafePatternRejected { .. }));
    assert!(err.is_security_rejection());
    assert!(runner.runs().is_empty());
}

#[tokio::test]
async fn test_rejected_dependency_fails_dependent() {
    let fixture = LoaderFixture::new();
    fixture.write_raw("fetcher", "eval \"$(echo hidden)\"\n");
    fixture.write_module("consumer", &["fetcher"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let err = manager.enable("consumer", false).await.unwrap_err();
    assert_eq!(
        err,
        ModuleError::DependencyFailed {
            module: "consumer".to_string(),
            dependency: "fetcher".to_string(),
        }
    );
    assert_eq!(manager.registry().state("fetcher").await, ModuleState::Rejected);
}

#[tokio::test]
async fn test_unknown_module_suggests_names() {
    let fixture = LoaderFixture::new();
    fixture.write_module("prompt", &[]);
    fixture.write_module("prompt-git", &[]);
    fixture.write_module("history", &[]);

    let manager = fixture.manager(MockRunner::new().shared());

    match manager.enable("promt", false).await.unwrap_err() {
        ModuleError::NotFound { name, suggestions } => {
            assert_eq!(name, "promt");
            assert_eq!(suggestions.first().map(String::as_str), Some("prompt"));
            assert!(!suggestions.contains(&"history".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_invalid_name_rejected_before_scan() {
    let fixture = LoaderFixture::new();
    let manager = fixture.manager(MockRunner::new().shared());

    for name in ["../etc", "has space", ""] {
        let err = manager.enable(name, false).await.unwrap_err();
        assert_eq!(err, ModuleError::InvalidName(name.to_string()));
    }
}

#[tokio::test]
async fn test_failed_module_can_be_retried() {
    let fixture = LoaderFixture::new();
    fixture.write_module("flaky", &[]);

    let failing = MockRunner::new().failing(&["flaky"]).shared();
    let manager = fixture.manager(failing.clone());
    assert!(manager.enable("flaky", false).await.is_err());
    assert!(manager.enable("flaky", false).await.is_err());
    assert_eq!(failing.run_count("flaky"), 2);
}

#[tokio::test]
async fn test_module_upstream_of_cycle_fails_on_dependency() {
    let fixture = LoaderFixture::new();
    fixture.write_module("alpha", &["beta"]);
    fixture.write_module("beta", &["alpha"]);
    fixture.write_module("top", &["alpha"]);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    let expected = ModuleError::DependencyFailed {
        module: "top".to_string(),
        dependency: "alpha".to_string(),
    };
    let err = manager.enable("top", false).await.unwrap_err();
    assert_eq!(err, expected);

    let registry = manager.registry();
    assert_eq!(registry.state("top").await, ModuleState::Failed);
    assert_eq!(registry.failure("top").await, Some(expected));
    for name in ["alpha", "beta"] {
        assert_eq!(registry.state(name).await, ModuleState::Failed);
        assert!(matches!(
            registry.failure(name).await,
            Some(ModuleError::CyclicDependency(_))
        ));
    }
    assert!(runner.runs().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_fixed_module_is_checked_again() {
    let fixture = LoaderFixture::new();
    let path = fixture.write_module("prompt", &[]);
    set_mode(&path, 0o644);

    let runner = MockRunner::new().shared();
    let manager = fixture.manager(runner.clone());

    assert!(manager.enable("prompt", false).await.is_err());
    assert_eq!(manager.registry().state("prompt").await, ModuleState::Rejected);

    set_mode(&path, 0o600);
    let outcome = manager.enable("prompt", false).await.unwrap();
    assert!(outcome.executed());
    assert_eq!(manager.registry().state("prompt").await, ModuleState::Loaded);
    assert!(manager.registry().entry("prompt").await.warnings.is_empty());
    assert_eq!(runner.run_count("prompt"), 1);
}
