use std::io::Write;

use widget_federation::config::ComposerConfig;
use widget_federation::error::FederationError;

#[test]
fn loads_host_config_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"{{
            "name": "shell",
            "remotes": {{ "notes_widget": "notes_widget@http://localhost:3001/_next/static/chunks/remoteEntry.js" }},
            "slots": [{{ "id": "log", "module": "notes_widget/Widget" }}],
            "retry": {{ "max_attempts": 3, "backoff": {{ "first_ms": 50 }} }}
        }}"#
    )
    .expect("write");
    let cfg = ComposerConfig::from_path(file.path()).expect("config");
    assert_eq!(cfg.name, "shell");
    assert_eq!(cfg.slots[0].title, "");
    assert_eq!(cfg.retry.attempts(), 3);
    assert_eq!(cfg.retry.backoff.first_ms, 50);
    assert_eq!(cfg.retry.backoff.max_ms, 5_000);
    assert_eq!(
        cfg.remotes["notes_widget"].url(),
        "http://localhost:3001/_next/static/chunks/remoteEntry.js"
    );
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ComposerConfig::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, FederationError::Config(_)), "{err}");
}

#[test]
fn malformed_module_request_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(br#"{ "slots": [{ "id": "x", "module": "no-slash" }] }"#)
        .expect("write");
    assert!(ComposerConfig::from_path(file.path()).is_err());
}
