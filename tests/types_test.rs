use chrono::TimeZone;
use serde_json::json;
use tattva::session::TurnOutcome;
use tattva::types::{Exchange, Feedback, Notice, Tone, Topic};

#[test]
fn topics_serialize_with_display_names() {
    assert_eq!(
        serde_json::to_value(Topic::PopCultureSports).unwrap(),
        json!("Pop Culture/Sports")
    );
    assert_eq!(Topic::ScienceTechnology.to_string(), "Science/Technology");
    let topic: Topic = serde_json::from_value(json!("Culture/History")).unwrap();
    assert_eq!(topic, Topic::CultureHistory);
}

#[test]
fn reflective_topics() {
    assert!(Topic::Spirituality.is_reflective());
    assert!(Topic::ScienceTechnology.is_reflective());
    assert!(!Topic::General.is_reflective());
    assert!(!Topic::PopCultureSports.is_reflective());
}

#[test]
fn tone_and_feedback_are_snake_case() {
    assert_eq!(serde_json::to_value(Tone::Playful).unwrap(), json!("playful"));
    assert_eq!(
        serde_json::to_value(Feedback::ThumbsUp).unwrap(),
        json!("thumbs_up")
    );
    assert_eq!(Feedback::ThumbsDown.to_string(), "thumbs_down");
}

#[test]
fn exchange_timestamp_has_second_precision() {
    let ts = chrono::Utc
        .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .unwrap()
        + chrono::Duration::milliseconds(750);
    let exchange = Exchange::at("hi", "hello", Topic::General, ts);
    assert_eq!(
        exchange.timestamp(),
        chrono::Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    );
    assert!(exchange.instruction().is_none());
}

#[test]
fn exchange_without_optional_fields_deserializes() {
    let exchange: Exchange = serde_json::from_value(json!({
        "input": "hi",
        "output": "hello",
        "topic": "General",
        "timestamp": "2025-01-01 08:00:00"
    }))
    .unwrap();
    assert_eq!(exchange.feedback(), None);
    assert_eq!(exchange.text_feedback(), None);
    assert_eq!(exchange.instruction(), None);
}

#[test]
fn legacy_record_without_topic_or_timestamp_reads_as_general_at_epoch() {
    let exchange: Exchange = serde_json::from_value(json!({
        "input": "hi",
        "output": "hello",
        "text_feedback": null
    }))
    .unwrap();
    assert_eq!(exchange.topic(), Topic::General);
    assert_eq!(exchange.timestamp().timestamp(), 0);
    assert_eq!(exchange.text_feedback(), None);

    let unknown: Exchange = serde_json::from_value(json!({
        "input": "hi",
        "output": "hello",
        "topic": "Astrology",
        "timestamp": "2025-01-01 08:00:00"
    }))
    .unwrap();
    assert_eq!(unknown.topic(), Topic::General);
}

#[test]
fn topic_labels_parse() {
    assert_eq!(Topic::from_label("Pop Culture/Sports"), Some(Topic::PopCultureSports));
    assert_eq!(Topic::from_label(" General "), Some(Topic::General));
    assert_eq!(Topic::from_label("general"), None);
}

#[test]
fn timestamps_are_written_in_local_time() {
    let ts = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let exchange = Exchange::at("hi", "hello", Topic::General, ts);
    let value = serde_json::to_value(&exchange).unwrap();
    let expected = ts
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    assert_eq!(value["timestamp"], json!(expected));

    let back: Exchange = serde_json::from_value(value).unwrap();
    assert_eq!(back.timestamp(), ts);
}

#[test]
fn bad_timestamp_is_rejected() {
    let result: Result<Exchange, _> = serde_json::from_value(json!({
        "input": "hi",
        "output": "hello",
        "topic": "General",
        "timestamp": "yesterday"
    }));
    assert!(result.is_err());
}

#[test]
fn notice_display_carries_level() {
    assert_eq!(Notice::warning("careful").to_string(), "[warning] careful");
    assert_eq!(Notice::error("broken").to_string(), "[error] broken");
}

#[test]
fn turn_outcome_is_tagged_by_status() {
    let outcome = TurnOutcome::Empty {
        notice: Notice::warning("No response received."),
    };
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["status"], "empty");
    assert_eq!(value["notice"]["level"], "warning");
    assert_eq!(outcome.notices().len(), 1);

    let reply = TurnOutcome::Reply {
        text: "ok".into(),
        topic: Topic::General,
        tone: Tone::Neutral,
        notices: vec![],
    };
    let value = serde_json::to_value(&reply).unwrap();
    assert_eq!(value["status"], "reply");
    assert_eq!(value["topic"], "General");
    assert_eq!(value["tone"], "neutral");
    assert!(reply.notices().is_empty());
}
