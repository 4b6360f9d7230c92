//! Configuration loading, validation, and fingerprint tests.

use mtg_spike_tracker::config::BACKEND_ENV_VAR;
use mtg_spike_tracker::{BackendConfig, ReleaseConfig, SpikeConfig, TrackerConfig, TrackerError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

// ---------------------------------------------------------------------------
// defaults / loading
// ---------------------------------------------------------------------------

#[test]
fn defaults_are_valid() {
    let config = TrackerConfig::default();

    assert_eq!(config.provider, "tcgplayer");
    assert_eq!(config.price_type, "retail");
    assert_eq!(config.state_days, 14);
    assert_eq!(config.spikes, SpikeConfig::default());
    assert_eq!(config.state_backend.kind(), "local_path");
    assert!(config.validate().is_ok());
}

#[test]
fn partial_file_fills_in_defaults() {
    let file = write_config(
        r#"{
            "state_days": 10,
            "spikes": {"price_floor": 2.5, "windows": [1, 7]},
            "state_backend": {"kind": "local_path", "dir": "/tmp/spikes"}
        }"#,
    );

    let config = TrackerConfig::from_path(file.path()).unwrap();

    assert_eq!(config.state_days, 10);
    assert_eq!(config.spikes.price_floor, 2.5);
    assert_eq!(config.spikes.windows, vec![1, 7]);
    assert_eq!(config.spikes.pct_threshold, 0.20);
    assert_eq!(config.provider, "tcgplayer");
    if std::env::var(BACKEND_ENV_VAR).is_err() {
        assert_eq!(
            config.state_backend,
            BackendConfig::LocalPath {
                dir: "/tmp/spikes".into()
            }
        );
    }
}

#[test]
fn remote_backend_is_parsed() {
    let file = write_config(
        r#"{
            "state_backend": {
                "kind": "remote_release_asset",
                "repository": "someone/mtg-prices"
            }
        }"#,
    );

    let config = TrackerConfig::from_path(file.path()).unwrap();

    if std::env::var(BACKEND_ENV_VAR).is_err() {
        match &config.state_backend {
            BackendConfig::RemoteReleaseAsset(release) => {
                assert_eq!(release.repository, "someone/mtg-prices");
                assert_eq!(release.tag, "state-latest");
                assert_eq!(release.token_env, "GITHUB_TOKEN");
            }
            other => panic!("unexpected backend: {:?}", other),
        }
    }
}

#[test]
fn malformed_file_is_a_configuration_error() {
    let file = write_config("{ not json");
    assert!(matches!(
        TrackerConfig::from_path(file.path()).unwrap_err(),
        TrackerError::Configuration(_)
    ));
}

#[test]
fn missing_file_is_an_error() {
    assert!(TrackerConfig::from_path("/definitely/not/here.json").is_err());
}

// ---------------------------------------------------------------------------
// backend override
// ---------------------------------------------------------------------------

#[test]
fn backend_kind_override_switches_backend() {
    let config = TrackerConfig::default()
        .with_backend_kind("remote_release_asset")
        .unwrap();
    assert_eq!(config.state_backend.kind(), "remote_release_asset");

    let config = config.with_backend_kind("local_path").unwrap();
    assert_eq!(config.state_backend.kind(), "local_path");
}

#[test]
fn backend_kind_override_keeps_matching_settings() {
    let config = TrackerConfig {
        state_backend: BackendConfig::RemoteReleaseAsset(ReleaseConfig {
            repository: "someone/prices".to_string(),
            ..ReleaseConfig::default()
        }),
        ..TrackerConfig::default()
    };

    let config = config.with_backend_kind("remote_release_asset").unwrap();

    match config.state_backend {
        BackendConfig::RemoteReleaseAsset(release) => assert_eq!(release.repository, "someone/prices"),
        other => panic!("unexpected backend: {:?}", other),
    }
}

#[test]
fn unknown_backend_kind_is_rejected() {
    assert!(matches!(
        TrackerConfig::default().with_backend_kind("s3").unwrap_err(),
        TrackerError::Configuration(_)
    ));
}

// ---------------------------------------------------------------------------
// validation
// ---------------------------------------------------------------------------

#[test]
fn zero_state_days_is_rejected() {
    let config = TrackerConfig {
        state_days: 0,
        ..TrackerConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn window_must_fit_in_state() {
    let config = TrackerConfig {
        state_days: 7,
        ..TrackerConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("7 days"));

    let config = TrackerConfig {
        state_days: 8,
        ..TrackerConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn empty_provider_is_rejected() {
    let config = TrackerConfig {
        provider: "  ".to_string(),
        ..TrackerConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn remote_backend_requires_repository() {
    let config = TrackerConfig {
        state_backend: BackendConfig::RemoteReleaseAsset(ReleaseConfig::default()),
        ..TrackerConfig::default()
    };
    assert!(matches!(
        config.validate().unwrap_err(),
        TrackerError::Configuration(_)
    ));
}

#[test]
fn invalid_retry_policy_is_rejected() {
    let mut config = TrackerConfig::default();
    config.retry.max_attempts = 0;
    assert!(config.validate().is_err());
}

// ---------------------------------------------------------------------------
// fingerprint
// ---------------------------------------------------------------------------

#[test]
fn fingerprint_is_stable_hex_sha256() {
    let a = TrackerConfig::default().fingerprint();
    let b = TrackerConfig::default().fingerprint();

    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn fingerprint_ignores_window_order_and_backend() {
    let mut reordered = TrackerConfig::default();
    reordered.spikes.windows = vec![7, 3, 1, 3];
    reordered.state_backend = BackendConfig::LocalPath {
        dir: "/elsewhere".into(),
    };

    assert_eq!(
        reordered.fingerprint(),
        TrackerConfig::default().fingerprint()
    );
}

#[test]
fn fingerprint_tracks_detection_settings() {
    let mut changed = TrackerConfig::default();
    changed.spikes.price_floor = 2.0;

    assert_ne!(changed.fingerprint(), TrackerConfig::default().fingerprint());
}
