use kiln_lib::BuildRequest;

use super::common::TestEnv;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_execution() {
  let env = TestEnv::new();
  env.write("slow.txt", "@sleep 50\nslow");
  let orchestrator = env.open();

  let (first, second) = tokio::join!(
    orchestrator.build(BuildRequest::new("slow.txt")),
    orchestrator.build(BuildRequest::new("slow.txt"))
  );

  let (first, second) = (first.unwrap(), second.unwrap());
  assert_eq!(first.fingerprint, second.fingerprint);
  assert_eq!(first.reference, second.reference);
  assert_eq!(env.counters.processed("slow.txt"), 1);
  assert_eq!(env.counters.writes(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_requests_in_session_build_once() {
  let env = TestEnv::new();
  env.write("slow.txt", "@sleep 30\nslow");

  let requests = (0..4).map(|_| BuildRequest::new("slow.txt")).collect();
  let report = env.open().build_all(requests).await;

  assert!(report.is_success());
  assert_eq!(report.succeeded.len(), 4);
  assert_eq!(report.built, 1);
  assert_eq!(env.counters.processed("slow.txt"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_nested_asset_builds_once() {
  let env = TestEnv::new();
  env.write("palette.txt", "@sleep 30\npalette");
  env.write("forest.txt", "@build palette.txt\nforest");
  env.write("desert.txt", "@build palette.txt\ndesert");

  let report = env
    .open()
    .build_all(vec![BuildRequest::new("forest.txt"), BuildRequest::new("desert.txt")])
    .await;

  assert!(report.is_success(), "{:?}", report.failures);
  assert_eq!(env.counters.processed("palette.txt"), 1);
  assert_eq!(report.built, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mutual_recursion_across_tasks_fails_instead_of_hanging() {
  let env = TestEnv::new();
  env.write("a.txt", "@sleep 20\n@build b.txt\na");
  env.write("b.txt", "@sleep 20\n@build a.txt\nb");

  let orchestrator = env.open();
  let session = orchestrator.build_all(vec![BuildRequest::new("a.txt"), BuildRequest::new("b.txt")]);
  let report = tokio::time::timeout(std::time::Duration::from_secs(10), session)
    .await
    .expect("circular builds must not deadlock");

  assert_eq!(report.failures.len(), 2);
  for failure in &report.failures {
    assert!(failure.error.is_circular(), "got {}", failure.error);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parallelism_bounds_concurrent_requests() {
  let env = TestEnv::new();
  for i in 0..3 {
    env.write(&format!("item{}.txt", i), "@sleep 40\nitem");
  }
  let orchestrator = env.open_with(env.config().with_parallelism(1));

  let started = std::time::Instant::now();
  let report = orchestrator
    .build_all((0..3).map(|i| BuildRequest::new(format!("item{}.txt", i))).collect())
    .await;

  assert!(report.is_success());
  assert!(started.elapsed() >= std::time::Duration::from_millis(120));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fail_fast_cancels_outstanding_requests() {
  let env = TestEnv::new();
  env.write("bad.txt", "@fail");
  env.write("slow1.txt", "@sleep 2000\none");
  env.write("slow2.txt", "@sleep 2000\ntwo");
  let orchestrator = env.open_with(env.config().with_parallelism(3).with_fail_fast(true));

  let report = orchestrator
    .build_all(vec![
      BuildRequest::new("bad.txt"),
      BuildRequest::new("slow1.txt"),
      BuildRequest::new("slow2.txt"),
    ])
    .await;

  assert!(!report.is_success());
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].request, "bad.txt");
  assert_eq!(report.cancelled, 2);
  assert!(report.succeeded.is_empty());
}
