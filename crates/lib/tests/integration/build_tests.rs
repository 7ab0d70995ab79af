use kiln_lib::{BuildRequest, Content, ParameterBag, PipelineError};

use super::common::TestEnv;

#[tokio::test]
async fn builds_artifact_into_output_dir() {
  let env = TestEnv::new();
  env.write("sprites/hero.txt", "hero");
  let orchestrator = env.open();

  let built = orchestrator.build(BuildRequest::new("sprites/hero.txt")).await.unwrap();

  assert_eq!(built.asset, "sprites/hero.txt");
  assert!(!built.cached);
  let artifact = built.reference.filename();
  assert!(artifact.starts_with(orchestrator.config().output_dir.join("sprites")));
  assert_eq!(artifact.extension().and_then(|e| e.to_str()), Some("kxb"));
  assert_eq!(std::fs::read_to_string(artifact).unwrap(), "testos\nhero\n");
}

#[tokio::test]
async fn asset_name_controls_output_path() {
  let env = TestEnv::new();
  env.write("hero.txt", "hero");
  let orchestrator = env.open();

  let reference = orchestrator
    .build_asset(BuildRequest::new("hero.txt").with_asset_name("characters/hero"))
    .await
    .unwrap();

  assert_eq!(
    reference.filename(),
    orchestrator.config().output_dir.join("characters").join("hero.kxb")
  );
}

#[tokio::test]
async fn identical_projects_produce_identical_fingerprints_and_bytes() {
  let first = TestEnv::new();
  let second = TestEnv::new();
  for env in [&first, &second] {
    env.write("level.txt", "row one\nrow two");
  }

  let a = first.open().build(BuildRequest::new("level.txt")).await.unwrap();
  let b = second.open().build(BuildRequest::new("level.txt")).await.unwrap();

  assert_eq!(a.fingerprint, b.fingerprint);
  assert_eq!(
    std::fs::read(a.reference.filename()).unwrap(),
    std::fs::read(b.reference.filename()).unwrap()
  );
}

#[tokio::test]
async fn second_build_in_session_runs_no_plugins() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  let orchestrator = env.open();

  let first = orchestrator.build(BuildRequest::new("a.txt")).await.unwrap();
  let second = orchestrator.build(BuildRequest::new("a.txt")).await.unwrap();

  assert_eq!(first.fingerprint, second.fingerprint);
  assert_eq!(env.counters.imports(), 1);
  assert_eq!(env.counters.total_processed(), 1);
  assert_eq!(env.counters.writes(), 1);
}

#[tokio::test]
async fn unchanged_inputs_are_reused_across_sessions() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  env.write("b.txt", "@build a.txt\nb");

  let report = env
    .open()
    .build_all(vec![BuildRequest::new("a.txt"), BuildRequest::new("b.txt")])
    .await;
  assert!(report.is_success());
  assert_eq!(report.built, 2);
  let imports = env.counters.imports();
  let writes = env.counters.writes();

  let report = env
    .open()
    .build_all(vec![BuildRequest::new("a.txt"), BuildRequest::new("b.txt")])
    .await;
  assert!(report.is_success());
  assert_eq!(report.built, 0);
  assert_eq!(report.cached, 2);
  assert!(report.succeeded.iter().all(|b| b.cached));
  assert_eq!(env.counters.imports(), imports);
  assert_eq!(env.counters.writes(), writes);
}

#[tokio::test]
async fn rebuild_ignores_cache() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  let built = env
    .open_with(env.config().with_rebuild(true))
    .build(BuildRequest::new("a.txt"))
    .await
    .unwrap();

  assert!(!built.cached);
  assert_eq!(env.counters.processed("a.txt"), 2);
}

#[tokio::test]
async fn parameters_separate_build_items() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  let orchestrator = env.open();

  let bang = orchestrator
    .build(BuildRequest::new("a.txt").with_parameter("suffix", "!"))
    .await
    .unwrap();
  let question = orchestrator
    .build(BuildRequest::new("a.txt").with_parameter("suffix", "?"))
    .await
    .unwrap();

  assert_ne!(bang.fingerprint, question.fingerprint);
  assert_ne!(bang.reference.filename(), question.reference.filename());
  assert_eq!(std::fs::read_to_string(bang.reference.filename()).unwrap(), "testos\na!\n");
  assert_eq!(std::fs::read_to_string(question.reference.filename()).unwrap(), "testos\na?\n");
  assert_eq!(env.counters.processed("a.txt"), 2);
}

#[tokio::test]
async fn equivalent_parameter_spellings_share_an_item() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  let orchestrator = env.open();

  let text = orchestrator
    .build(BuildRequest::new("a.txt").with_parameter("repeat", "2"))
    .await
    .unwrap();
  let integer = orchestrator
    .build(BuildRequest::new("a.txt").with_parameter("repeat", 2i64))
    .await
    .unwrap();

  assert_eq!(text.fingerprint, integer.fingerprint);
  assert_eq!(env.counters.processed("a.txt"), 1);
}

#[tokio::test]
async fn mistyped_parameter_fails_the_item() {
  let env = TestEnv::new();
  env.write("a.txt", "a");

  let err = env
    .open()
    .build(BuildRequest::new("a.txt").with_parameter("repeat", "lots"))
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::ParameterTypeMismatch { .. }), "got {:?}", err);
  assert_eq!(env.counters.imports(), 0);
}

#[tokio::test]
async fn non_finite_parameters_are_rejected() {
  let env = TestEnv::new();
  env.write("s.txt", "s");
  let orchestrator = env.open();

  for value in [f64::INFINITY, f64::NAN, f64::NEG_INFINITY] {
    let err = orchestrator
      .build(BuildRequest::new("s.txt").with_parameter("Gamma", value))
      .await
      .unwrap_err();
    match err {
      PipelineError::ParameterTypeMismatch { asset, key, .. } => {
        assert_eq!(asset.as_deref(), Some("s.txt"));
        assert_eq!(key, "Gamma");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  assert_eq!(env.counters.total_processed(), 0);
}

#[tokio::test]
async fn asset_name_cannot_escape_output_dir() {
  let env = TestEnv::new();
  env.write("hero.txt", "hero");
  let orchestrator = env.open();
  let outside = env.output_dir().parent().unwrap().join("escaped");

  for name in ["../escaped", "characters/../../escaped", outside.to_str().unwrap()] {
    let err = orchestrator
      .build(BuildRequest::new("hero.txt").with_asset_name(name))
      .await
      .unwrap_err();
    match err {
      PipelineError::InvalidAssetName { asset, name: rejected } => {
        assert_eq!(asset, "hero.txt");
        assert_eq!(rejected, name);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  assert!(!outside.with_extension("kxb").exists());
  assert_eq!(env.counters.writes(), 0);

  let inside = orchestrator
    .build(BuildRequest::new("hero.txt").with_asset_name("characters/../hero"))
    .await
    .unwrap();
  assert_eq!(inside.reference.filename(), orchestrator.config().output_dir.join("hero.kxb"));
}

#[tokio::test]
async fn build_and_load_reads_artifact_back() {
  let env = TestEnv::new();
  env.write("a.txt", "alpha");
  let orchestrator = env.open();

  let loaded = orchestrator.load_asset::<String>(BuildRequest::new("a.txt")).await.unwrap();
  assert_eq!(loaded.as_str(), "alpha\n");

  let content = orchestrator.build_and_load_asset(BuildRequest::new("a.txt")).await.unwrap();
  assert!(content.is::<String>());
}

#[tokio::test]
async fn nested_build_output_is_embedded() {
  let env = TestEnv::new();
  env.write("tiles.txt", "tile");
  env.write("level.txt", "@build tiles.txt\nlevel");
  let orchestrator = env.open();

  let loaded = orchestrator.load_asset::<String>(BuildRequest::new("level.txt")).await.unwrap();
  assert_eq!(loaded.as_str(), "tile\nlevel\n");

  let level = orchestrator.items().into_iter().find(|i| i.asset == "level.txt").unwrap();
  let tiles = orchestrator.items().into_iter().find(|i| i.asset == "tiles.txt").unwrap();
  assert_eq!(orchestrator.dependents(&tiles.fingerprint), vec![level.fingerprint]);
}

#[tokio::test]
async fn top_level_convert_runs_processor() {
  let env = TestEnv::new();
  let orchestrator = env.open();

  let converted = orchestrator
    .convert(
      Content::new("x".to_string()),
      "ScriptProcessor",
      ParameterBag::new().with("suffix", "!"),
    )
    .await
    .unwrap();

  assert_eq!(converted.get::<String>().unwrap(), "x!\n");
}

#[tokio::test]
async fn top_level_convert_cannot_record_dependencies() {
  let env = TestEnv::new();
  let orchestrator = env.open();

  let err = orchestrator
    .convert(Content::new("@dep a.dat".to_string()), "ScriptProcessor", ParameterBag::new())
    .await
    .unwrap_err();

  match err {
    PipelineError::ProcessFailure { cause, .. } => {
      assert!(cause.to_string().contains("requires an active build item"), "got {}", cause);
    }
    other => panic!("unexpected {:?}", other),
  }
}

#[tokio::test]
async fn convert_inside_item_records_dependencies_on_the_item() {
  let env = TestEnv::new();
  env.write("extra.dat", "one");
  env.write("outer.txt", "@convert @dep extra.dat\nouter");

  let orchestrator = env.open();
  let built = orchestrator.build(BuildRequest::new("outer.txt")).await.unwrap();
  let entry = orchestrator.cache().get(&built.fingerprint).unwrap();
  assert!(
    entry.dependencies.iter().any(|d| d.path.ends_with("extra.dat")),
    "got {:?}",
    entry.dependencies
  );

  let reused = env.open().build(BuildRequest::new("outer.txt")).await.unwrap();
  assert!(reused.cached);

  env.write("extra.dat", "two");
  let orchestrator = env.open();
  let rebuilt = orchestrator.build(BuildRequest::new("outer.txt")).await.unwrap();
  assert!(!rebuilt.cached);
  let text = orchestrator
    .load_asset::<String>(BuildRequest::new("outer.txt"))
    .await
    .unwrap();
  assert!(text.contains("two"), "got {:?}", text);
  assert_eq!(env.counters.processed("outer.txt"), 4);
}

#[tokio::test]
async fn convert_rejects_unknown_processor_and_wrong_input() {
  let env = TestEnv::new();
  let orchestrator = env.open();

  let missing = orchestrator
    .convert(Content::new("x".to_string()), "NoSuchProcessor", ParameterBag::new())
    .await
    .unwrap_err();
  assert!(matches!(missing, PipelineError::ProcessorNotFound { .. }));

  let mismatch = orchestrator
    .convert(Content::new(42u32), "ScriptProcessor", ParameterBag::new())
    .await
    .unwrap_err();
  assert!(matches!(mismatch, PipelineError::ProcessFailure { .. }));
}

#[tokio::test]
async fn warnings_are_reported_per_item() {
  let env = TestEnv::new();
  env.write("w.txt", "@warn palette has 300 colors\nw");

  let report = env.open().build_all(vec![BuildRequest::new("w.txt")]).await;

  assert!(report.is_success());
  assert_eq!(
    report.warnings.get("w.txt"),
    Some(&vec!["palette has 300 colors".to_string()])
  );
}

#[tokio::test]
async fn clean_removes_artifacts_and_entries() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  env.write("nested/b.txt", "b");
  let orchestrator = env.open();
  let report = orchestrator
    .build_all(vec![BuildRequest::new("a.txt"), BuildRequest::new("nested/b.txt")])
    .await;
  assert!(report.is_success());

  let stats = orchestrator.clean().unwrap();

  assert_eq!(stats.entries_removed, 2);
  assert_eq!(stats.files_removed, 2);
  assert!(orchestrator.cache().is_empty());
  for built in &report.succeeded {
    assert!(!built.reference.filename().exists());
  }
  assert!(!env.output_dir().join("nested").exists());
}
