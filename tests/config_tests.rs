use lora_reliable::config::EngineConfig;
use lora_reliable::error::LoRaError;
use lora_reliable::link::JammingDetector;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn loads_partial_file_over_defaults() {
    let file = write_config(
        r#"{
            "link": { "baudrate": 115200 },
            "retry": { "max_retries": 5 },
            "lbt": {
                "retries_per_channel": 2,
                "detector": { "kind": "composite_scoring", "activity_threshold": 8 }
            }
        }"#,
    );

    let config = EngineConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.link.baudrate, 115_200);
    assert_eq!(config.link.tx_complete_timeout_ms, 8000);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.attempts_per_value, 3);
    assert_eq!(config.lbt.retries_per_channel, 2);
    assert_eq!(config.lbt.max_channel_attempts, 8);
    match &config.lbt.detector {
        JammingDetector::CompositeScoring(cfg) => {
            assert_eq!(cfg.activity_threshold, 8);
            assert_eq!(cfg.jammed_score, 2);
        }
        other => panic!("unexpected detector {other:?}"),
    }
}

#[test]
fn saved_config_loads_back() {
    let mut config = EngineConfig::default();
    config.backoff.timeout_ms = 30_000;
    config.lbt.detector = JammingDetector::composite();

    let file = write_config(&serde_json::to_string_pretty(&config).unwrap());
    assert_eq!(EngineConfig::from_json_file(file.path()).unwrap(), config);
}

#[test]
fn rejects_invalid_values() {
    let file = write_config(r#"{ "lbt": { "max_channel_attempts": 0 } }"#);
    assert!(matches!(
        EngineConfig::from_json_file(file.path()),
        Err(LoRaError::Config(_))
    ));

    let file = write_config(r#"{ "retry": { "soft_retry_limit": 0 } }"#);
    assert!(matches!(
        EngineConfig::from_json_file(file.path()),
        Err(LoRaError::Config(_))
    ));

    let file = write_config(
        r#"{ "lbt": { "detector": { "kind": "trigger_and_listen", "trials": 1, "threshold": 2 } } }"#,
    );
    assert!(EngineConfig::from_json_file(file.path()).is_err());
}

#[test]
fn rejects_malformed_json() {
    let file = write_config("{ \"retry\": ");
    let err = EngineConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, LoRaError::Config(_)));
    assert!(!err.is_fatal());
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, LoRaError::Io(_)));
}

#[test]
fn loads_large_composite_weights() {
    let file = write_config(
        r#"{ "lbt": { "detector": {
            "kind": "composite_scoring",
            "passive_weight": 200,
            "timing_weight": 100,
            "repeat_weight": 255,
            "jammed_score": 255
        } } }"#,
    );

    let config = EngineConfig::from_json_file(file.path()).unwrap();
    match &config.lbt.detector {
        JammingDetector::CompositeScoring(cfg) => assert_eq!(cfg.max_score(), 555),
        other => panic!("unexpected detector {other:?}"),
    }
}
