//! End-to-end debate rounds over HTTP against a mock OpenAI-compatible server

use agon::{DebateConfig, DebateOrchestrator, DebateSession, EntityId, Error, Phase};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

fn config_for(server_url: &str, memory_yaml: &str) -> DebateConfig {
    let yaml = format!(
        r#"
providers:
  mock:
    base_url: "{server_url}/v1"
    timeout_secs: 5
entities:
  contestant_a:
    display_name: "Contestant A"
    provider: mock
    model: "model-a"
  contestant_b:
    display_name: "Contestant B"
    provider: mock
    model: "model-b"
  moderator:
    display_name: "Moderator"
    provider: mock
    model: "model-m"
turn_timeout_secs: 5
{memory_yaml}
"#
    );
    let config = DebateConfig::from_yaml(&yaml).unwrap();
    config.validate().unwrap();
    config
}

async fn reply(server: &mut ServerGuard, model: &str, text: &str) -> Mock {
    server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "model": model })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": format!("cmpl-{model}"),
                "model": model,
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": text },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
            })
            .to_string(),
        )
        .create_async()
        .await
}

#[tokio::test]
async fn full_round_over_http() {
    let mut server = mockito::Server::new_async().await;
    let a = reply(&mut server, "model-a", "Humans built the internet.").await;
    let b = reply(&mut server, "model-b", "Most of it is forgotten.").await;
    let moderator = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({ "model": "model-m" })),
            Matcher::Regex("Contestant A: Humans built the internet.".to_string()),
            Matcher::Regex("Contestant B: Most of it is forgotten.".to_string()),
        ]))
        .with_status(200)
        .with_body(
            json!({
                "choices": [{ "message": { "role": "assistant", "content": "Both of you: define value." } }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = config_for(&server.url(), "");
    let orchestrator = DebateOrchestrator::from_config(&config).unwrap();
    let mut session = DebateSession::new();

    let round = orchestrator
        .advance_round(&mut session, "Is human knowledge valuable?")
        .await
        .unwrap();

    a.assert_async().await;
    b.assert_async().await;
    moderator.assert_async().await;

    let pairs: Vec<_> = round.iter().map(|u| u.as_pair()).collect();
    assert_eq!(
        pairs,
        [
            ("Contestant A", "Humans built the internet."),
            ("Contestant B", "Most of it is forgotten."),
            ("Moderator", "Both of you: define value."),
        ]
    );
    assert_eq!(session.summary(), "Moderator: Both of you: define value.");
    assert_eq!(session.round(), 2);
    assert_eq!(session.usage().total_tokens, 30);
}

#[tokio::test]
async fn server_error_leaves_session_retryable() {
    let mut server = mockito::Server::new_async().await;
    let _a = reply(&mut server, "model-a", "Opening.").await;
    let failing_b = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(json!({ "model": "model-b" })))
        .with_status(500)
        .with_body("upstream exploded")
        .expect(1)
        .create_async()
        .await;

    let config = config_for(&server.url(), "");
    let orchestrator = DebateOrchestrator::from_config(&config).unwrap();
    let mut session = DebateSession::new();

    orchestrator.advance(&mut session, "Tabs or spaces?").await.unwrap();
    let summary_before = session.summary().to_string();

    let err = orchestrator.advance(&mut session, "").await.unwrap_err();
    failing_b.assert_async().await;

    assert!(matches!(err, Error::ModelInvocation { ref entity, .. } if entity == "contestant_b"));
    assert_eq!(session.phase(), Phase::BTurn);
    assert_eq!(session.next_speaker(), EntityId::ContestantB);
    assert_eq!(session.round(), 1);
    assert_eq!(session.summary(), summary_before);
}

#[tokio::test]
async fn sled_memory_persists_entity_logs() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;
    let _a = reply(&mut server, "model-a", "a").await;
    let _b = reply(&mut server, "model-b", "b").await;
    let _m = reply(&mut server, "model-m", "m").await;

    let memory_yaml = format!(
        "memory:\n  backend: sled\n  path: \"{}\"\n",
        dir.path().join("memory").display()
    );
    let config = config_for(&server.url(), &memory_yaml);
    let orchestrator = DebateOrchestrator::from_config(&config).unwrap();
    let mut session = DebateSession::new();

    orchestrator.advance_round(&mut session, "Cats or dogs?").await.unwrap();

    let handle = orchestrator
        .memory()
        .get_or_create(session.id(), "moderator")
        .await
        .unwrap();
    let history = orchestrator.memory().history(handle).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "Topic: Cats or dogs?\nContestant A: a\nContestant B: b\n");
    assert_eq!(history[1].content, "m");

    orchestrator.reset(&mut session).await.unwrap();
    assert!(orchestrator.memory().history(handle).await.is_err());
}
