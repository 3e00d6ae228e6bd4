use std::error::Error;

use lore::errors::BotError;

#[test]
fn bot_error_implements_error_trait() {
    fn assert_error<T: Error>(_: &T) {}

    let error = BotError::Validation("missing channel".to_string());
    assert_error(&error);
}

#[test]
fn bot_error_display() {
    let error = BotError::Api("invalid_auth".to_string());
    assert_eq!(format!("{error}"), "Failed to access Slack API: invalid_auth");

    let error = BotError::Generation("model unavailable".to_string());
    assert_eq!(
        format!("{error}"),
        "Answer engine failure: model unavailable"
    );

    let error = BotError::Store("connection refused".to_string());
    assert_eq!(
        format!("{error}"),
        "Queue store failure: connection refused"
    );

    let error = BotError::Throttled("chat.update: ratelimited".to_string());
    assert_eq!(
        format!("{error}"),
        "Delivery throttled by Slack: chat.update: ratelimited"
    );
}

#[test]
fn only_throttles_are_retryable() {
    assert!(BotError::Throttled("HTTP 429".to_string()).is_throttle());
    assert!(!BotError::Api("channel_not_found".to_string()).is_throttle());
    assert!(!BotError::Validation("empty".to_string()).is_throttle());
    assert!(!BotError::Generation("engine down".to_string()).is_throttle());
    assert!(!BotError::Store("redis down".to_string()).is_throttle());
    assert!(!BotError::Http("timeout".to_string()).is_throttle());
}

#[test]
fn bot_error_from_conversions() {
    let err = anyhow::anyhow!("test error");
    let bot_err: BotError = err.into();
    match bot_err {
        BotError::Api(msg) => assert!(msg.contains("test error")),
        _ => panic!("Unexpected error type"),
    }

    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let bot_err: BotError = json_err.into();
    assert!(matches!(bot_err, BotError::Store(_)));

    // These conversions only need to exist; constructing the source errors
    // requires a live endpoint.
    #[allow(unused)]
    fn check_reqwest_conversion(err: reqwest::Error) -> BotError {
        BotError::from(err)
    }
    #[allow(unused)]
    fn check_redis_conversion(err: redis::RedisError) -> BotError {
        BotError::from(err)
    }
    #[allow(unused)]
    fn check_slack_conversion(err: slack_morphism::errors::SlackClientError) -> BotError {
        BotError::from(err)
    }
}
