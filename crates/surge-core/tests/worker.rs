//! Step-level tests of the virtual user sender loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use surge_core::event::{self, EventReceiver};
use surge_core::worker::{build_client, Sender, StepOutcome};
use surge_core::{
    ErrorKind, NoopSetup, RequestContext, RequestSetup, ResponseRecord, RunConfig, Scenario,
    SetupError, Template,
};
use test_utils::{unused_base_url, LogCapture, TargetServer, TOKEN};

fn setup_fn<F>(f: F) -> Arc<dyn RequestSetup>
where
    F: Fn(&Template, &mut RequestContext, Option<&ResponseRecord>) -> Result<(), SetupError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn sender(
    templates: Vec<Template>,
    base_url: &str,
    setup: Arc<dyn RequestSetup>,
) -> (Sender, EventReceiver) {
    let config = RunConfig::new(base_url, 1, Duration::from_secs(1));
    let client = build_client(&config).unwrap();
    let (events, receiver) = event::channel(16);
    let scenario = Scenario::new(templates).unwrap();
    let sender = Sender::new(0, 0, scenario, Arc::from(base_url), client, setup, events, false);
    (sender, receiver)
}

#[tokio::test]
async fn test_one_event_per_completed_call() {
    let server = TargetServer::start().await.unwrap();
    let (mut sender, mut receiver) = sender(
        vec![Template::new("0", "/ok"), Template::new("1", "/status/500")],
        &server.base_url(),
        Arc::new(NoopSetup),
    );

    assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);
    assert_eq!(sender.position(), Some(0));
    let first = receiver.responses.try_recv().unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.body(), r#"{"status":"ok"}"#);
    // body + 2, plus at least content-type and content-length headers
    assert!(first.size > first.body.len() as u64 + 2 + 20);

    assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);
    assert_eq!(sender.position(), Some(1));
    let second = receiver.responses.try_recv().unwrap();
    assert_eq!(second.status, 500);
    assert!(!second.is_success());

    assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);
    assert_eq!(sender.position(), Some(0));

    assert_eq!(server.hits(), 3);
    assert!(receiver.errors.try_recv().is_err());
}

#[tokio::test]
async fn test_setup_failure_discards_previous_response() {
    let server = TargetServer::start().await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let setup = setup_fn(move |template, _request, previous| {
        log.lock()
            .unwrap()
            .push((template.id.clone(), previous.is_some()));
        if template.id == "1" {
            Err(SetupError::new("refusing step 1"))
        } else {
            Ok(())
        }
    });

    let (mut sender, _receiver) = sender(
        vec![Template::new("0", "/ok"), Template::new("1", "/ok")],
        &server.base_url(),
        setup,
    );

    for _ in 0..3 {
        sender.step().await.unwrap();
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("0".to_string(), false),
            ("1".to_string(), true),
            ("0".to_string(), false),
        ]
    );
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_setup_failure_restarts_without_sending() {
    let server = TargetServer::start().await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let setup = setup_fn(move |template, _request, _previous| {
        log.lock().unwrap().push(template.id.clone());
        if template.id == "1" {
            Err(SetupError::new("refusing step 1"))
        } else {
            Ok(())
        }
    });

    let (mut sender, mut receiver) = sender(
        vec![
            Template::new("0", "/ok"),
            Template::new("1", "/ok"),
            Template::new("2", "/ok"),
        ],
        &server.base_url(),
        setup,
    );

    let outcomes = [
        sender.step().await.unwrap(),
        sender.step().await.unwrap(),
        sender.step().await.unwrap(),
        sender.step().await.unwrap(),
    ];
    assert_eq!(
        outcomes,
        [
            StepOutcome::Completed,
            StepOutcome::SetupFailed,
            StepOutcome::Completed,
            StepOutcome::SetupFailed,
        ]
    );
    assert_eq!(sender.position(), None);

    assert_eq!(*seen.lock().unwrap(), vec!["0", "1", "0", "1"]);
    assert_eq!(server.hits(), 2);

    let mut responses = 0;
    while receiver.responses.try_recv().is_ok() {
        responses += 1;
    }
    assert_eq!(responses, 2);
    assert!(receiver.errors.try_recv().is_err());
}

#[tokio::test]
async fn test_always_failing_setup_never_advances() {
    let server = TargetServer::start().await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let setup = setup_fn(move |template, _request, previous| {
        log.lock().unwrap().push((template.id.clone(), previous.is_some()));
        Err(SetupError::new("never ready"))
    });

    let (mut sender, mut receiver) = sender(
        vec![Template::new("0", "/ok"), Template::new("1", "/ok")],
        &server.base_url(),
        setup,
    );

    for _ in 0..50 {
        assert_eq!(sender.step().await.unwrap(), StepOutcome::SetupFailed);
        assert_eq!(sender.position(), None);
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 50);
    assert!(seen.iter().all(|(id, previous)| id == "0" && !previous));
    assert_eq!(server.hits(), 0);
    assert!(receiver.responses.try_recv().is_err());
    assert!(receiver.errors.try_recv().is_err());
}

#[tokio::test]
async fn test_previous_response_feeds_next_step() {
    let server = TargetServer::start().await.unwrap();
    let first_step_previous = Arc::new(Mutex::new(Vec::new()));
    let log = first_step_previous.clone();
    let setup = setup_fn(move |template, request, previous| {
        if template.id == "login" {
            log.lock().unwrap().push(previous.is_some());
            return Ok(());
        }
        let previous = previous.ok_or_else(|| SetupError::new("no login response"))?;
        let value: serde_json::Value = previous
            .body_json()
            .map_err(|e| SetupError::new(e.to_string()))?;
        let token = value["token"]
            .as_str()
            .ok_or_else(|| SetupError::new("no token"))?;
        request.set_body_json(&serde_json::json!({ "token": token }))
    });

    let (mut sender, _receiver) = sender(
        vec![
            Template::new("login", "/token"),
            Template::new("use", "/echo").with_method("POST"),
        ],
        &server.base_url(),
        setup,
    );

    for _ in 0..4 {
        assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);
    }

    // Wrapping to the first template clears the carried response.
    assert_eq!(*first_step_previous.lock().unwrap(), vec![false, false]);

    let echoes: Vec<_> = server
        .requests()
        .into_iter()
        .filter(|r| r.path == "/echo")
        .collect();
    assert_eq!(echoes.len(), 2);
    for echo in echoes {
        assert_eq!(echo.method, "POST");
        assert_eq!(echo.body, format!(r#"{{"token":"{}"}}"#, TOKEN));
    }
}

#[tokio::test]
async fn test_timeout_emits_error_and_clears_previous() {
    let server = TargetServer::start().await.unwrap();
    let previous_seen = Arc::new(Mutex::new(None));
    let log = previous_seen.clone();
    let setup = setup_fn(move |template, _request, previous| {
        if template.id == "after" {
            *log.lock().unwrap() = Some(previous.is_some());
        }
        Ok(())
    });

    let (mut sender, mut receiver) = sender(
        vec![
            Template::new("first", "/ok"),
            Template::new("slow", "/delay/2000").with_timeout(Duration::from_millis(100)),
            Template::new("after", "/ok"),
        ],
        &server.base_url(),
        setup,
    );

    assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);
    assert_eq!(sender.step().await.unwrap(), StepOutcome::Failed);
    // The cursor already moved past the failed template.
    assert_eq!(sender.position(), Some(1));
    assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);
    assert_eq!(sender.position(), Some(2));

    assert_eq!(*previous_seen.lock().unwrap(), Some(false));

    let error = receiver.errors.try_recv().unwrap();
    assert_eq!(error.kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_connection_refused_is_not_a_timeout() {
    let base_url = unused_base_url().await.unwrap();
    let (mut sender, mut receiver) = sender(
        vec![Template::new("0", "/ok")],
        &base_url,
        Arc::new(NoopSetup),
    );

    assert_eq!(sender.step().await.unwrap(), StepOutcome::Failed);
    let error = receiver.errors.try_recv().unwrap();
    assert_eq!(error.kind, ErrorKind::Other);
    assert!(receiver.responses.try_recv().is_err());
}

#[tokio::test]
async fn test_step_fails_once_aggregator_is_gone() {
    let server = TargetServer::start().await.unwrap();
    let (mut sender, receiver) = sender(
        vec![Template::new("0", "/ok")],
        &server.base_url(),
        Arc::new(NoopSetup),
    );
    drop(receiver);

    assert!(sender.step().await.is_err());
}

#[tokio::test]
async fn test_debug_request_logs_before_send() {
    let server = TargetServer::start().await.unwrap();
    let base_url = server.base_url();
    let config = RunConfig::new(base_url.as_str(), 1, Duration::from_secs(1));
    let client = build_client(&config).unwrap();
    let (events, _receiver) = event::channel(4);
    let setup = setup_fn(|_template, request, _previous| {
        request.set_body("ping-body");
        Ok(())
    });
    let scenario = Scenario::new(vec![Template::new("0", "/echo").with_method("POST")]).unwrap();
    let mut sender = Sender::new(
        0,
        0,
        scenario,
        Arc::from(base_url.as_str()),
        client,
        setup,
        events,
        true,
    );

    let logs = LogCapture::new();
    let _guard = tracing::subscriber::set_default(logs.subscriber());
    assert_eq!(sender.step().await.unwrap(), StepOutcome::Completed);

    let contents = logs.contents();
    assert!(contents.contains("surge::debug"));
    assert!(contents.contains("POST"));
    assert!(contents.contains(&format!("{}/echo", base_url)));
    assert!(contents.contains("ping-body"));
}
