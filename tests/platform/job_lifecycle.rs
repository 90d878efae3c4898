use crate::helpers::{drain_bus, harness, job_request};
use testexec_engine::errors::EngineError;
use testexec_engine::io_models::job::{TestJobStatus, TestResultStatus};
use testexec_engine::io_models::message::PlatformMsgPayload;
use testexec_engine::object_storage::ObjectStorage;
use testexec_engine::repository::JobRepository;
use tokio_util::sync::CancellationToken;

const REPORT_XML: &str = "<tests>\
    <test name='t1' result='Passed' duration='0.5'/>\
    <test name='t2' result='Failed' duration='1.2'><failure><message>boom</message></failure></test>\
</tests>";

#[tokio::test]
async fn test_submission_happy_path() {
    let mut harness = harness();
    let cancel = CancellationToken::new();

    let submission = harness.platform.submit_job(&job_request(), &cancel).await.unwrap();
    assert!(submission.workload_name.starts_with("test-job-"));
    assert_eq!(submission.workload_name.len(), "test-job-".len() + 32);
    assert_eq!(
        submission.message,
        format!("Test job created and running: {}", submission.workload_name)
    );

    // a Running row was persisted
    let job = harness.repo.get_job(submission.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, TestJobStatus::Running);
    assert_eq!(job.lob_id, "acme");
    assert_eq!(job.created_by, "u1");

    // the workload landed in the lob namespace with policy-driven shape
    assert!(harness.cluster.namespaces().contains("testexec-acme"));
    let specs = harness.cluster.created_specs();
    assert_eq!(specs.len(), 1);
    let spec = &specs[0];
    assert_eq!(spec.namespace, "testexec-acme");
    assert_eq!(spec.image, "registry.local:5000/dotnet:latest");
    assert_eq!(spec.active_deadline_seconds, 30 * 60);
    assert_eq!(spec.env.get("REPO_URL").map(String::as_str), Some("https://example.com/r.git"));
    assert_eq!(spec.limits.cpu_limit, "1");
    assert_eq!(spec.limits.memory_limit, "2Gi");

    // the workload is not terminal yet
    let completed = harness
        .platform
        .orchestrator()
        .is_job_completed(&submission.workload_name, "acme", &cancel)
        .await
        .unwrap();
    assert!(!completed);

    let events = drain_bus(&mut harness.bus);
    assert!(
        events
            .iter()
            .any(|msg| matches!(&msg.payload, PlatformMsgPayload::TestJobCreated { namespace, .. } if namespace == "testexec-acme"))
    );
}

#[tokio::test]
async fn test_completion_with_report_xml() {
    let mut harness = harness();
    let cancel = CancellationToken::new();

    let submission = harness.platform.submit_job(&job_request(), &cancel).await.unwrap();
    drain_bus(&mut harness.bus);

    let outcome = harness
        .platform
        .tracker()
        .complete_job(
            submission.job_id,
            TestJobStatus::Succeeded,
            REPORT_XML,
            Some(REPORT_XML.as_bytes()),
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(outcome.job.tests_passed, 1);
    assert_eq!(outcome.job.tests_failed, 1);
    assert_eq!(outcome.job.tests_skipped, 0);
    assert!(outcome.job.end_time.is_some());
    assert!(outcome.artifact_uploaded);
    assert_eq!(outcome.artifact_error, None);

    let results = harness.repo.test_results_for_job(submission.job_id).await.unwrap();
    assert_eq!(results.len(), 2);
    let failed = results.iter().find(|r| r.status == TestResultStatus::Failed).unwrap();
    assert_eq!(failed.test_name, "t2");
    assert_eq!(failed.error_message.as_deref(), Some("boom"));

    // both artifacts land under the tenancy-scoped prefix
    let prefix = format!("acme/pay/{}/", submission.job_id);
    let mut keys = harness.storage.list(&prefix).await.unwrap();
    keys.sort();
    assert_eq!(
        keys,
        vec![format!("{prefix}full-log.txt"), format!("{prefix}test-results.xml")]
    );
    let log = harness.storage.get(&format!("{prefix}full-log.txt")).await.unwrap();
    assert!(String::from_utf8(log).unwrap().contains("Totals: 1 passed, 1 failed, 0 skipped"));

    // the bus saw the metadata message keyed by job id
    let events = drain_bus(&mut harness.bus);
    let metadata = events
        .iter()
        .find_map(|msg| match &msg.payload {
            PlatformMsgPayload::TestResultMetadata(metadata) => Some((msg.key.clone(), metadata.clone())),
            _ => None,
        })
        .expect("metadata message published");
    assert_eq!(metadata.0, submission.job_id.to_string());
    assert_eq!(metadata.1.total_tests, 2);
    assert_eq!(metadata.1.tests_passed, 1);
    assert_eq!(metadata.1.status, TestJobStatus::Succeeded);
}

#[tokio::test]
async fn test_malformed_report_still_commits_the_transition() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let submission = harness.platform.submit_job(&job_request(), &cancel).await.unwrap();
    let outcome = harness
        .platform
        .tracker()
        .complete_job(submission.job_id, TestJobStatus::Failed, "<not xml", None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.job.status, TestJobStatus::Failed);
    assert_eq!(
        (outcome.job.tests_passed, outcome.job.tests_failed, outcome.job.tests_skipped),
        (0, 0, 0)
    );
    assert!(outcome.job.end_time.is_some());
    assert!(harness.repo.test_results_for_job(submission.job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_completing_an_unknown_job_is_not_found() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let missing = harness
        .platform
        .tracker()
        .complete_job(uuid::Uuid::new_v4(), TestJobStatus::Succeeded, "", None, &cancel)
        .await;
    assert!(matches!(missing, Err(EngineError::JobNotFound { .. })));
}

#[tokio::test]
async fn test_team_quota_rejects_submission() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let mut admin = harness.platform.policy().get_admin_configuration(true).await.unwrap();
    admin.resource_management.max_concurrent_jobs_per_team = 1;
    harness.platform.policy().save_admin_configuration(&admin).await.unwrap();

    harness.platform.submit_job(&job_request(), &cancel).await.unwrap();
    let second = harness.platform.submit_job(&job_request(), &cancel).await;
    match second {
        Err(EngineError::QuotaExceeded { active, max_allowed, .. }) => {
            assert_eq!(active, 1);
            assert_eq!(max_allowed, 1);
        }
        other => panic!("expected quota rejection, got {other:?}"),
    }

    // a different team of the same lob is unaffected
    let mut other_team = job_request();
    other_team.team_id = "ops".to_string();
    harness.platform.submit_job(&other_team, &cancel).await.unwrap();
}

#[tokio::test]
async fn test_oversized_artifact_aborts_only_the_upload_step() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let mut admin = harness.platform.policy().get_admin_configuration(true).await.unwrap();
    admin.retention.max_test_result_file_size_mb = 0;
    harness.platform.policy().save_admin_configuration(&admin).await.unwrap();

    let submission = harness.platform.submit_job(&job_request(), &cancel).await.unwrap();
    let outcome = harness
        .platform
        .tracker()
        .complete_job(
            submission.job_id,
            TestJobStatus::Succeeded,
            REPORT_XML,
            Some(REPORT_XML.as_bytes()),
            &cancel,
        )
        .await
        .unwrap();

    assert!(!outcome.artifact_uploaded);
    assert!(outcome.artifact_error.as_deref().unwrap_or_default().contains("too large"));
    assert!(harness.storage.is_empty());

    // the transition itself still committed
    assert_eq!(outcome.job.status, TestJobStatus::Succeeded);
    assert_eq!(outcome.job.tests_passed, 1);
}

#[tokio::test]
async fn test_cluster_failure_converges_the_row_to_failed() {
    let harness = harness();
    let cancel = CancellationToken::new();
    harness.cluster.fail_create.store(true, std::sync::atomic::Ordering::SeqCst);

    let err = harness.platform.submit_job(&job_request(), &cancel).await.unwrap_err();
    assert!(matches!(err, EngineError::Cluster(_)));

    // exactly one row, already terminal
    let jobs = harness
        .repo
        .find_jobs(&testexec_engine::repository::JobQuery::default())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, TestJobStatus::Failed);
    assert!(jobs[0].end_time.is_some());
}

#[tokio::test]
async fn test_cleanup_tears_the_workload_down() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let submission = harness.platform.submit_job(&job_request(), &cancel).await.unwrap();
    assert_eq!(harness.cluster.job_names(), vec![submission.workload_name.clone()]);

    harness
        .platform
        .orchestrator()
        .cleanup_test_job(&submission.workload_name, "acme", &cancel)
        .await
        .unwrap();
    assert!(harness.cluster.job_names().is_empty());

    // idempotent: a second teardown of the same workload succeeds
    harness
        .platform
        .orchestrator()
        .cleanup_test_job(&submission.workload_name, "acme", &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_scheduled_jobs_reuse_the_submission_pipeline() {
    let mut harness = harness();
    let cancel = CancellationToken::new();

    let yaml = "name: nightly\nrepoUrl: https://example.com/r.git\ntestImageType: DotNet\nscheduleType: Interval\nintervalMinutes: 1\n";
    let schedule = harness
        .platform
        .scheduler()
        .create_schedule_from_yaml(yaml, "acme", "pay")
        .await
        .unwrap();

    let later = chrono::Utc::now() + chrono::Duration::minutes(2);
    let fired = harness
        .platform
        .scheduler()
        .process_due_schedules(later, &cancel)
        .await
        .unwrap();
    assert_eq!(fired, 1);

    // drive the queued request through the platform, as the consumer would
    let message = harness.queue.try_recv().unwrap();
    harness.platform.process_queue_message(message, &cancel).await;

    let jobs = harness
        .repo
        .find_jobs(&testexec_engine::repository::JobQuery::default())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].schedule_id, Some(schedule.id));
    assert_eq!(jobs[0].created_by, "schedule:nightly");
}
