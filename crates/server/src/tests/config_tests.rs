use super::{
    apply_env_overrides, apply_file_overrides, normalize_database_url, prepare_database_url,
    Settings,
};

use std::{
    collections::HashMap,
    env, fs,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:data\\w.db"), "sqlite://data/w.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn creates_parent_dir_for_relative_sqlite_url() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("wardrobe_server_test_{suffix}"));
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn defaults_leave_collaborators_unconfigured() {
    let settings = Settings::default();
    assert!(settings.weather_api_key.is_none());
    assert!(settings.gemini_api_key.is_none());
    assert_eq!(settings.action_timeout(), Duration::from_secs(45));
}

#[test]
fn prefixed_env_vars_win_over_bare_ones() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        env_from(&[
            ("SERVER_BIND", "0.0.0.0:1"),
            ("APP__BIND_ADDR", "0.0.0.0:2"),
            ("WEATHER_API_KEY", "w-bare"),
            ("APP__WEATHER_API_KEY", "w-app"),
            ("GEMINI_API_KEY", "g-key"),
            ("APP__ACTION_TIMEOUT_SECS", "12"),
            ("APP__HTTP_TIMEOUT_SECS", "not-a-number"),
        ]),
    );
    assert_eq!(settings.server_bind, "0.0.0.0:2");
    assert_eq!(settings.weather_api_key.as_deref(), Some("w-app"));
    assert_eq!(settings.gemini_api_key.as_deref(), Some("g-key"));
    assert_eq!(settings.action_timeout_secs, 12);
    assert_eq!(settings.http_timeout_secs, 30);
}

#[test]
fn blank_api_key_counts_as_missing() {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, env_from(&[("GEMINI_API_KEY", "   ")]));
    assert!(settings.gemini_api_key.is_none());
}

#[test]
fn file_overrides_apply_before_env() {
    let mut settings = Settings::default();
    apply_file_overrides(
        &mut settings,
        r#"
bind_addr = "127.0.0.1:9000"
database_url = "sqlite://./tmp/w.db"
gemini_model = "gemini-pro"
action_timeout_secs = 5
"#,
    );
    apply_env_overrides(&mut settings, env_from(&[("DATABASE_URL", "sqlite::memory:")]));

    assert_eq!(settings.server_bind, "127.0.0.1:9000");
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.gemini_model.as_deref(), Some("gemini-pro"));
    assert_eq!(settings.action_timeout_secs, 5);
}

#[test]
fn unparsable_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file_overrides(&mut settings, "this is = = not toml");
    assert_eq!(settings.server_bind, Settings::default().server_bind);
}
