use kiln_lib::{BuildRequest, PipelineError};

use super::common::TestEnv;

#[tokio::test]
async fn self_reference_is_circular() {
  let env = TestEnv::new();
  env.write("a.txt", "@build a.txt");

  let err = env.open().build(BuildRequest::new("a.txt")).await.unwrap_err();

  match err {
    PipelineError::CircularDependency { chain } => assert_eq!(chain, vec!["a.txt", "a.txt"]),
    other => panic!("unexpected {:?}", other),
  }
}

#[tokio::test]
async fn top_level_cycle_failure_names_the_request() {
  let env = TestEnv::new();
  env.write("a.txt", "@build a.txt");

  let report = env.open().build_all(vec![BuildRequest::new("a.txt")]).await;

  assert_eq!(report.failures.len(), 1);
  let failure = &report.failures[0];
  assert!(failure.error.is_circular(), "got {}", failure.error);
  assert_eq!(failure.chain, vec!["a.txt"]);
}

#[tokio::test]
async fn indirect_cycle_reports_full_chain() {
  let env = TestEnv::new();
  env.write("a.txt", "@build b.txt");
  env.write("b.txt", "@build c.txt");
  env.write("c.txt", "@build a.txt");

  let err = env.open().build(BuildRequest::new("a.txt")).await.unwrap_err();

  match err {
    PipelineError::CircularDependency { chain } => {
      assert_eq!(chain, vec!["a.txt", "b.txt", "c.txt", "a.txt"]);
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[tokio::test]
async fn one_failure_does_not_stop_the_session() {
  let env = TestEnv::new();
  env.write("first.txt", "first");
  env.write("bad.txt", "@fail");
  env.write("last.txt", "last");

  let report = env
    .open()
    .build_all(vec![
      BuildRequest::new("first.txt"),
      BuildRequest::new("bad.txt"),
      BuildRequest::new("last.txt"),
    ])
    .await;

  assert!(!report.is_success());
  let succeeded: Vec<&str> = report.succeeded.iter().map(|b| b.asset.as_str()).collect();
  assert_eq!(succeeded, vec!["first.txt", "last.txt"]);
  assert_eq!(report.failures.len(), 1);

  let failure = &report.failures[0];
  assert_eq!(failure.request, "bad.txt");
  assert_eq!(failure.chain, vec!["bad.txt"]);
  match failure.root_cause() {
    PipelineError::ProcessFailure { cause, .. } => assert_eq!(cause.to_string(), "scripted failure"),
    other => panic!("unexpected {:?}", other),
  }
}

#[tokio::test]
async fn nested_failure_carries_chain() {
  let env = TestEnv::new();
  env.write("bad.txt", "@fail");
  env.write("level.txt", "@build bad.txt\nlevel");

  let report = env.open().build_all(vec![BuildRequest::new("level.txt")]).await;

  assert_eq!(report.failures.len(), 1);
  let failure = &report.failures[0];
  assert_eq!(failure.chain, vec!["level.txt", "bad.txt"]);
  assert!(matches!(failure.error, PipelineError::DependencyFailed { .. }));
  assert_eq!(failure.root_cause().asset(), Some("bad.txt"));
  assert_eq!(report.failed, 2);
}

#[tokio::test]
async fn nested_parameter_error_names_the_child() {
  let env = TestEnv::new();
  env.write("child.txt", "child");
  env.write("level.txt", "@build child.txt repeat=lots\nlevel");

  let report = env.open().build_all(vec![BuildRequest::new("level.txt")]).await;

  assert_eq!(report.failures.len(), 1);
  let failure = &report.failures[0];
  assert_eq!(failure.chain, vec!["level.txt", "child.txt"]);
  assert!(matches!(failure.error, PipelineError::DependencyFailed { .. }), "got {:?}", failure.error);
  match failure.root_cause() {
    PipelineError::ParameterTypeMismatch { asset, key, .. } => {
      assert_eq!(asset.as_deref(), Some("child.txt"));
      assert_eq!(key, "repeat");
    }
    other => panic!("unexpected {:?}", other),
  }
  assert_eq!(env.counters.processed("child.txt"), 0);
}

#[tokio::test]
async fn import_failure_is_reported() {
  let env = TestEnv::new();
  env.write("a.txt", "@import-fail");

  let err = env.open().build(BuildRequest::new("a.txt")).await.unwrap_err();

  match err {
    PipelineError::ImportFailure { asset, cause } => {
      assert_eq!(asset, "a.txt");
      assert_eq!(cause.to_string(), "importer rejected source");
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[tokio::test]
async fn missing_source_fails_import() {
  let env = TestEnv::new();

  let err = env.open().build(BuildRequest::new("ghost.txt")).await.unwrap_err();

  assert!(matches!(err, PipelineError::ImportFailure { .. }), "got {:?}", err);
}

#[tokio::test]
async fn unknown_extension_has_no_importer() {
  let env = TestEnv::new();
  env.write("hero.png", "pixels");

  let err = env.open().build(BuildRequest::new("hero.png")).await.unwrap_err();

  assert!(matches!(err, PipelineError::ImporterNotFound { .. }), "got {:?}", err);
}

#[tokio::test]
async fn unknown_processor_name_is_rejected() {
  let env = TestEnv::new();
  env.write("a.txt", "a");

  let err = env
    .open()
    .build(BuildRequest::new("a.txt").with_processor("ModelProcessor"))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::ProcessorNotFound { .. }), "got {:?}", err);
}

#[tokio::test]
async fn failures_are_memoized_within_a_session() {
  let env = TestEnv::new();
  env.write("bad.txt", "@fail");
  let orchestrator = env.open();

  let first = orchestrator.build(BuildRequest::new("bad.txt")).await.unwrap_err();
  let second = orchestrator.build(BuildRequest::new("bad.txt")).await.unwrap_err();

  assert_eq!(first.to_string(), second.to_string());
  assert_eq!(env.counters.processed("bad.txt"), 1);
}

#[tokio::test]
async fn failed_items_are_not_cached() {
  let env = TestEnv::new();
  env.write("a.txt", "@fail");
  assert!(env.open().build(BuildRequest::new("a.txt")).await.is_err());

  env.write("a.txt", "fixed");
  let orchestrator = env.open();
  let built = orchestrator.build(BuildRequest::new("a.txt")).await.unwrap();

  assert!(!built.cached);
  assert_eq!(orchestrator.cache().len(), 1);
}
