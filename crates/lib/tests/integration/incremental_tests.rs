use kiln_lib::BuildRequest;

use super::common::TestEnv;

fn requests(paths: &[&str]) -> Vec<BuildRequest> {
  paths.iter().map(|p| BuildRequest::new(*p)).collect()
}

#[tokio::test]
async fn changed_dependency_rebuilds_only_affected_items() {
  let env = TestEnv::new();
  env.write("data/x.dat", "v1");
  env.write("x.txt", "@dep data/x.dat\nx");
  env.write("y.txt", "@build x.txt\ny");
  env.write("z.txt", "z");

  let report = env.open().build_all(requests(&["x.txt", "y.txt", "z.txt"])).await;
  assert!(report.is_success(), "{:?}", report.failures);
  assert_eq!(env.counters.processed("x.txt"), 1);

  env.write("data/x.dat", "v2");
  let report = env.open().build_all(requests(&["x.txt", "y.txt", "z.txt"])).await;
  assert!(report.is_success(), "{:?}", report.failures);

  assert_eq!(env.counters.processed("x.txt"), 2);
  assert_eq!(env.counters.processed("y.txt"), 2);
  assert_eq!(env.counters.processed("z.txt"), 1);
  assert_eq!(report.built, 2);
  assert_eq!(report.cached, 1);
}

#[tokio::test]
async fn deleted_dependency_triggers_rebuild() {
  let env = TestEnv::new();
  let dep = env.write("shared.pal", "palette");
  env.write("a.txt", "@dep shared.pal\na");
  env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  std::fs::remove_file(dep).unwrap();
  let built = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  assert!(!built.cached);
  assert_eq!(env.counters.processed("a.txt"), 2);
}

#[tokio::test]
async fn changed_source_replaces_previous_entry() {
  let env = TestEnv::new();
  env.write("a.txt", "one");
  let first = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  env.write("a.txt", "two");
  let orchestrator = env.open();
  let second = orchestrator.build(BuildRequest::new("a.txt")).await.unwrap();

  assert_ne!(first.fingerprint, second.fingerprint);
  assert_eq!(first.reference.filename(), second.reference.filename());
  assert_eq!(orchestrator.cache().len(), 1);
  assert_eq!(
    std::fs::read_to_string(second.reference.filename()).unwrap(),
    "testos\ntwo\n"
  );
}

#[tokio::test]
async fn missing_artifact_is_rebuilt() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  let built = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  std::fs::remove_file(built.reference.filename()).unwrap();
  let rebuilt = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  assert!(!rebuilt.cached);
  assert!(rebuilt.reference.filename().exists());
  assert_eq!(env.counters.writes(), 2);
}

#[tokio::test]
async fn tampered_artifact_is_rebuilt() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  let built = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  std::fs::write(built.reference.filename(), "garbage").unwrap();
  let rebuilt = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  assert!(!rebuilt.cached);
  assert_eq!(
    std::fs::read_to_string(rebuilt.reference.filename()).unwrap(),
    "testos\na\n"
  );
}

#[tokio::test]
async fn changed_nested_source_rebuilds_parent() {
  let env = TestEnv::new();
  env.write("tiles.txt", "tile");
  env.write("level.txt", "@build tiles.txt\nlevel");
  env.open().build(BuildRequest::new("level.txt")).await.unwrap();

  env.write("tiles.txt", "stone");
  let orchestrator = env.open();
  let loaded = orchestrator.load_asset::<String>(BuildRequest::new("level.txt")).await.unwrap();

  assert_eq!(loaded.as_str(), "stone\nlevel\n");
  assert_eq!(env.counters.processed("level.txt"), 2);
  assert_eq!(env.counters.processed("tiles.txt"), 2);
}

#[tokio::test]
async fn corrupt_cache_entry_only_forces_rebuild() {
  let env = TestEnv::new();
  env.write("a.txt", "a");
  let orchestrator = env.open();
  let built = orchestrator.build(BuildRequest::new("a.txt")).await.unwrap();
  let entry_path = orchestrator
    .config()
    .cache_dir()
    .join(format!("{}.json", built.fingerprint));
  drop(orchestrator);

  std::fs::write(&entry_path, "{ not json").unwrap();
  let rebuilt = env.open().build(BuildRequest::new("a.txt")).await.unwrap();

  assert!(!rebuilt.cached);
  assert_eq!(rebuilt.fingerprint, built.fingerprint);
  assert_eq!(env.counters.processed("a.txt"), 2);
}
