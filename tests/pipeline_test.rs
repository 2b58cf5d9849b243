mod common;

use chrono::Utc;
use common::{Harness, MODEL, advice_json, no_advice_json};
use mentor_core::config::MentorConfig;
use mentor_core::gate::{Decision, DenyReason, daily_key};
use mentor_core::kv::KvStore;
use mentor_core::mentor::PipelineOutcome;
use mentor_core::model::{Conversation, Goal, Memory, TranscriptSegment};
use mentor_core::usage::Feature;
use std::sync::atomic::Ordering;
use std::time::Duration;

const TEXT: &str = "to team good morning everyone";

fn messages() -> Vec<TranscriptSegment> {
    vec![TranscriptSegment::user(
        "send slack message to team good morning everyone",
    )]
}

async fn run(h: &Harness) -> PipelineOutcome {
    h.pipeline.run("u1", TEXT, &messages()).await
}

#[tokio::test(start_paused = true)]
async fn dispatches_confident_advice() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.7));

    let outcome = run(&h).await;
    assert_eq!(
        outcome,
        PipelineOutcome::Dispatched {
            text: "Nice start to the day.".to_string()
        }
    );

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].uid, "u1");
    assert_eq!(sent[0].app_name, "Omi");
    assert_eq!(sent[0].capability, "mentor");
    assert_eq!(h.gate.daily_count("u1").await.unwrap(), 1);
    assert_eq!(
        h.gate.check("u1", h.pipeline.capability()).await,
        Decision::Deny(DenyReason::LocalRateLimited)
    );
}

#[tokio::test(start_paused = true)]
async fn below_threshold_is_silent_but_billed() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.55));

    let outcome = run(&h).await;
    assert!(matches!(outcome, PipelineOutcome::BelowThreshold { threshold, .. } if threshold == 0.60));
    assert!(h.sink.sent().is_empty());
    assert_eq!(h.gate.daily_count("u1").await.unwrap(), 0);
    assert_eq!(h.gate.check("u1", h.pipeline.capability()).await, Decision::Allow);

    let usage = h.usage.get_and_clear();
    assert_eq!(usage.len(), 1);
    let (key, counts) = usage.into_iter().next().unwrap();
    assert_eq!(key.uid, "u1");
    assert_eq!(key.feature, Feature::RealtimeIntegrations);
    assert_eq!(key.model, MODEL);
    assert_eq!(counts.input_tokens, 1200);
}

#[tokio::test(start_paused = true)]
async fn frequency_zero_spends_nothing() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.9));
    h.users.set_frequency("u1", 0);

    assert_eq!(run(&h).await, PipelineOutcome::Disabled);
    assert_eq!(h.model.calls(), 0);
    assert!(h.usage.get_and_clear().is_empty());
    assert_eq!(h.memories.get_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unmapped_frequency_returns_quietly() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.9));
    h.users.set_frequency("u1", 9);

    assert_eq!(run(&h).await, PipelineOutcome::Unmapped(9));
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn daily_cap_denies_before_any_llm_work() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.9));
    h.kv.setex(
        &daily_key("u1", Utc::now().date_naive()),
        Duration::from_secs(3600),
        b"12",
    )
    .await
    .unwrap();

    assert_eq!(
        run(&h).await,
        PipelineOutcome::Denied(DenyReason::DailyCapReached)
    );
    assert_eq!(h.model.calls(), 0);
    assert_eq!(h.memories.get_calls(), 0);
    assert!(h.usage.get_and_clear().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_run_inside_window_is_rate_limited() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.9));
    assert!(run(&h).await.is_dispatched());
    assert_eq!(
        run(&h).await,
        PipelineOutcome::Denied(DenyReason::LocalRateLimited)
    );
    assert_eq!(h.model.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn text_length_bounds() {
    let exact = "a".repeat(150);
    let h = Harness::new(advice_json(&exact, 0.9));
    assert_eq!(run(&h).await, PipelineOutcome::Dispatched { text: exact });

    let h = Harness::new(advice_json(&"b".repeat(151), 0.9));
    match run(&h).await {
        PipelineOutcome::Dispatched { text } => assert_eq!(text.chars().count(), 150),
        other => panic!("expected dispatch, got {other:?}"),
    }

    let h = Harness::new(advice_json("abcd", 0.9));
    assert_eq!(run(&h).await, PipelineOutcome::InvalidText);
    assert!(h.sink.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_advice_and_malformed_output_are_silent() {
    let h = Harness::new(no_advice_json());
    assert_eq!(run(&h).await, PipelineOutcome::NoAdvice);

    h.model.respond("I think you should call your mother.");
    assert_eq!(run(&h).await, PipelineOutcome::NoAdvice);

    h.model.fail.store(true, Ordering::SeqCst);
    assert_eq!(run(&h).await, PipelineOutcome::NoAdvice);
    assert!(h.sink.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_send_is_not_recorded() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.9));
    h.sink.fail.store(true, Ordering::SeqCst);

    assert_eq!(run(&h).await, PipelineOutcome::DispatchFailed);
    assert_eq!(h.gate.daily_count("u1").await.unwrap(), 0);
    assert_eq!(h.gate.check("u1", h.pipeline.capability()).await, Decision::Allow);
}

#[tokio::test(start_paused = true)]
async fn threshold_follows_frequency() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.75));
    h.users.set_frequency("u1", 1);
    assert!(matches!(run(&h).await, PipelineOutcome::BelowThreshold { .. }));

    h.users.set_frequency("u1", 2);
    assert!(run(&h).await.is_dispatched());
}

#[tokio::test(start_paused = true)]
async fn prompt_carries_context() {
    let h = Harness::new(no_advice_json());
    h.users.set_name("u1", "Ada");
    h.memories.set("u1", vec![Memory::new("Training for a half marathon")]);
    *h.goals.goals.lock() = vec![
        Goal { title: "Run a marathon".to_string(), is_active: true },
        Goal { title: "Old goal".to_string(), is_active: false },
        Goal { title: "Learn Portuguese".to_string(), is_active: true },
    ];
    *h.vectors.conversation_ids.lock() = vec!["c1".to_string()];
    *h.conversations.conversations.lock() = vec![Conversation {
        id: "c1".to_string(),
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        category: "personal".to_string(),
        title: "Race planning".to_string(),
        overview: "Picked the spring half marathon.".to_string(),
    }];

    run(&h).await;
    let (system, prompt) = h.model.last_prompt.lock().clone().unwrap();
    assert!(system.contains("Ada's proactive mentor"));
    assert!(prompt.contains("- Training for a half marathon"));
    assert!(prompt.contains("- Run a marathon"));
    assert!(prompt.contains("- Learn Portuguese"));
    assert!(!prompt.contains("Old goal"));
    assert!(prompt.contains("Race planning"));
    assert!(prompt.ends_with(TEXT));
    assert_eq!(h.conversations.requested.lock().as_slice(), ["c1".to_string()]);

    let schema = h.model.last_schema.lock().clone().unwrap();
    assert!(schema["properties"]["has_advice"].is_object());
    assert!(schema.to_string().contains("notification_text"));
}

#[tokio::test(start_paused = true)]
async fn context_failures_degrade_to_empty() {
    let h = Harness::new(advice_json("Nice start to the day.", 0.9));
    h.memories.fail.store(true, Ordering::SeqCst);
    h.goals.fail.store(true, Ordering::SeqCst);
    h.vectors.fail.store(true, Ordering::SeqCst);

    assert!(run(&h).await.is_dispatched());
    let (_, prompt) = h.model.last_prompt.lock().clone().unwrap();
    assert!(prompt.contains("goals:\nNone"));
    assert!(prompt.contains("Related past conversations:\nNone"));
}

#[tokio::test(start_paused = true)]
async fn custom_thresholds_apply() {
    let mut config = MentorConfig::default();
    config.frequency_thresholds.insert(3, 0.95);
    let h = Harness::with_config(config, advice_json("Nice start to the day.", 0.9));
    assert!(matches!(run(&h).await, PipelineOutcome::BelowThreshold { .. }));
}
