use std::collections::BTreeMap;
use std::time::Duration;

use jobmon_engine::{
    ClientSettings, EngineEvent, EngineHandle, FailureKind, JobStatus, PollEvent, PollOutcome,
    PollSettings, PollUpdate, RunRequest,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_polling() -> PollSettings {
    PollSettings {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(20),
        ..PollSettings::default()
    }
}

fn engine_for(server: &MockServer) -> EngineHandle {
    let client = ClientSettings::with_base_url(&format!("{}/api", server.uri())).unwrap();
    EngineHandle::new(client, fast_polling()).unwrap()
}

/// Drains engine events until `done` matches one of them or the deadline passes.
async fn collect_until(
    engine: &EngineHandle,
    done: impl Fn(&EngineEvent) -> bool,
) -> Vec<EngineEvent> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while tokio::time::Instant::now() < deadline {
        while let Some(event) = engine.try_recv() {
            let finished = done(&event);
            events.push(event);
            if finished {
                return events;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("engine did not finish in time; got {events:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_then_watch_until_completed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/status/job-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "running", "progress": 50, "output": "PLAY" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/status/job-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed",
                "progress": 100,
                "output": "PLAY\nRECAP"
            })),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    engine.submit(
        7,
        RunRequest {
            playbook: "site.yml".to_string(),
            hosts: vec!["web1".to_string()],
            extra_vars: BTreeMap::new(),
        },
    );
    let submitted = collect_until(&engine, |e| matches!(e, EngineEvent::Submitted { .. })).await;
    assert_eq!(
        submitted.last(),
        Some(&EngineEvent::Submitted {
            card_id: 7,
            result: Ok("job-1".to_string()),
        })
    );

    engine.watch("job-1");
    let events = collect_until(&engine, |e| matches!(e, EngineEvent::PollFinished { .. })).await;

    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Poll(PollEvent {
                update: PollUpdate::Progress(p),
                ..
            }) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![50, 100]);
    assert!(events.contains(&EngineEvent::Poll(PollEvent {
        job_id: "job-1".to_string(),
        update: PollUpdate::Terminal(JobStatus::Completed),
    })));
    assert_eq!(
        events.last(),
        Some(&EngineEvent::PollFinished {
            job_id: "job-1".to_string(),
            outcome: PollOutcome::Terminal(JobStatus::Completed),
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_submit_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "no hosts" })))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    engine.submit(
        1,
        RunRequest {
            playbook: "site.yml".to_string(),
            hosts: Vec::new(),
            extra_vars: BTreeMap::new(),
        },
    );
    let events = collect_until(&engine, |e| matches!(e, EngineEvent::Submitted { .. })).await;
    match events.last() {
        Some(EngineEvent::Submitted {
            card_id: 1,
            result: Err(err),
        }) => assert_eq!(err.kind, FailureKind::Rejected),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_local_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    engine.watch("job-2");
    collect_until(&engine, |e| {
        matches!(
            e,
            EngineEvent::Poll(PollEvent {
                update: PollUpdate::Status(JobStatus::Running),
                ..
            })
        )
    })
    .await;

    engine.cancel("job-2");
    // The two events race each other; wait for whichever is still missing.
    let mut events =
        collect_until(&engine, |e| matches!(e, EngineEvent::PollFinished { .. })).await;
    let cancelled = EngineEvent::CancelCompleted {
        job_id: "job-2".to_string(),
        result: Ok(()),
    };
    if !events.contains(&cancelled) {
        events.extend(collect_until(&engine, |e| e == &cancelled).await);
    }
    assert!(events.contains(&cancelled));
    assert!(events.contains(&EngineEvent::PollFinished {
        job_id: "job-2".to_string(),
        outcome: PollOutcome::Aborted,
    }));
}

#[tokio::test(flavor = "multi_thread")]
async fn second_watch_for_same_job_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status/job-3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({ "status": "running" })),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    engine.watch("job-3");
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.watch("job-3");

    let events = collect_until(&engine, |e| matches!(e, EngineEvent::WatchRejected { .. })).await;
    assert!(matches!(
        events.last(),
        Some(EngineEvent::WatchRejected { job_id, .. }) if job_id == "job-3"
    ));
    engine.stop_watching("job-3");
    collect_until(&engine, |e| matches!(e, EngineEvent::PollFinished { .. })).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_right_after_watch_aborts_the_loop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status/job-5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "running", "progress": 10 }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let engine = engine_for(&server);
    engine.watch("job-5");
    engine.stop_watching("job-5");

    let events =
        collect_until(&engine, |e| matches!(e, EngineEvent::PollFinished { .. })).await;
    assert_eq!(
        events.last(),
        Some(&EngineEvent::PollFinished {
            job_id: "job-5".to_string(),
            outcome: PollOutcome::Aborted,
        })
    );
    assert!(!events.iter().any(|e| matches!(
        e,
        EngineEvent::Poll(PollEvent {
            update: PollUpdate::Terminal(_),
            ..
        })
    )));
}
