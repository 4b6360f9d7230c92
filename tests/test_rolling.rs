//! Rolling state store tests: ingest merging, truncation, window lookups.

mod common;

use common::{build_state, d, foil, key, store};
use mtg_spike_tracker::rolling::SEED_LOOKBACK_DAYS;
use mtg_spike_tracker::{RollingState, RollingStateStore, TrackerError};
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// construction
// ---------------------------------------------------------------------------

#[test]
fn zero_window_length_is_a_configuration_error() {
    let err = RollingStateStore::new(0, "tcgplayer", "retail").unwrap_err();
    assert!(matches!(err, TrackerError::Configuration(_)));
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

#[test]
fn ingest_into_empty_state_records_prices() {
    let s = store(14);
    let today = HashMap::from([(key("a"), Some(5.0)), (foil("a"), Some(12.5))]);

    let state = s.ingest(&RollingState::default(), &today, d("2024-03-01")).unwrap();

    assert_eq!(state.len(), 2);
    assert_eq!(state.price_on(&key("a"), d("2024-03-01")), Some(5.0));
    assert_eq!(state.price_on(&foil("a"), d("2024-03-01")), Some(12.5));
    assert_eq!(state.provider, "tcgplayer");
    assert_eq!(state.price_type, "retail");
}

#[test]
fn finishes_are_distinct_keys() {
    let s = store(14);
    let today = HashMap::from([(key("a"), Some(5.0))]);
    let state = s.ingest(&RollingState::default(), &today, d("2024-03-01")).unwrap();

    assert!(state.contains_key(&key("a")));
    assert!(!state.contains_key(&foil("a")));
}

#[test]
fn key_missing_today_gets_explicit_absent_marker() {
    let s = store(14);
    let day1 = HashMap::from([(key("a"), Some(5.0)), (key("b"), Some(7.0))]);
    let day2 = HashMap::from([(key("a"), Some(5.5))]);

    let state = s.ingest(&RollingState::default(), &day1, d("2024-03-01")).unwrap();
    let state = s.ingest(&state, &day2, d("2024-03-02")).unwrap();

    assert!(state.has_entry(&key("b"), d("2024-03-02")));
    assert_eq!(state.price_on(&key("b"), d("2024-03-02")), None);
    assert_eq!(state.price_on(&key("b"), d("2024-03-01")), Some(7.0));
}

#[test]
fn explicit_none_is_recorded_as_absent() {
    let s = store(14);
    let today = HashMap::from([(key("a"), None)]);
    let state = s.ingest(&RollingState::default(), &today, d("2024-03-01")).unwrap();

    assert!(state.has_entry(&key("a"), d("2024-03-01")));
    assert_eq!(state.price_on(&key("a"), d("2024-03-01")), None);
}

#[test]
fn unusable_prices_are_recorded_as_absent() {
    let s = store(14);
    let today = HashMap::from([
        (key("neg"), Some(-1.0)),
        (key("nan"), Some(f64::NAN)),
        (key("inf"), Some(f64::INFINITY)),
        (key("zero"), Some(0.0)),
    ]);
    let state = s.ingest(&RollingState::default(), &today, d("2024-03-01")).unwrap();

    assert_eq!(state.price_on(&key("neg"), d("2024-03-01")), None);
    assert_eq!(state.price_on(&key("nan"), d("2024-03-01")), None);
    assert_eq!(state.price_on(&key("inf"), d("2024-03-01")), None);
    assert_eq!(state.price_on(&key("zero"), d("2024-03-01")), Some(0.0));
}

#[test]
fn reingesting_a_date_replaces_instead_of_appending() {
    let s = store(14);
    let state = s.ingest(
        &RollingState::default(),
        &HashMap::from([(key("a"), Some(5.0))]),
        d("2024-03-01"),
    ).unwrap();
    let state = s.ingest(&state, &HashMap::from([(key("a"), Some(6.0))]), d("2024-03-01")).unwrap();

    assert_eq!(state.dates(&key("a")), vec![d("2024-03-01")]);
    assert_eq!(state.price_on(&key("a"), d("2024-03-01")), Some(6.0));
}

#[test]
fn reingest_with_absent_overwrites_earlier_price_for_that_date() {
    let s = store(14);
    let state = s.ingest(
        &RollingState::default(),
        &HashMap::from([(key("a"), Some(5.0))]),
        d("2024-03-01"),
    ).unwrap();
    let state = s.ingest(&state, &HashMap::new(), d("2024-03-01")).unwrap();

    assert_eq!(state.price_on(&key("a"), d("2024-03-01")), None);
}

#[test]
fn ingest_is_idempotent() {
    let s = store(14);
    let prior = build_state(
        &s,
        &[(key("a"), vec![("2024-03-01", Some(5.0)), ("2024-03-02", Some(5.5))])],
    );
    let today = HashMap::from([(key("a"), Some(6.0)), (key("b"), Some(9.0))]);

    let once = s.ingest(&prior, &today, d("2024-03-03")).unwrap();
    let twice = s.ingest(&once, &today, d("2024-03-03")).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn ingest_does_not_mutate_prior() {
    let s = store(14);
    let prior = build_state(&s, &[(key("a"), vec![("2024-03-01", Some(5.0))])]);
    let snapshot = prior.clone();

    s.ingest(&prior, &HashMap::from([(key("a"), Some(8.0))]), d("2024-03-02"))
        .unwrap();

    assert_eq!(prior, snapshot);
}

#[test]
fn dates_stay_strictly_increasing_after_out_of_order_ingest() {
    let s = store(14);
    let state = build_state(
        &s,
        &[(key("a"), vec![("2024-03-01", Some(5.0)), ("2024-03-03", Some(7.0))])],
    );
    let state = s.ingest(&state, &HashMap::from([(key("a"), Some(6.0))]), d("2024-03-02")).unwrap();

    assert_eq!(
        state.dates(&key("a")),
        vec![d("2024-03-01"), d("2024-03-02"), d("2024-03-03")]
    );
}

#[test]
fn history_from_another_price_source_is_rejected() {
    let prior = build_state(&store(14), &[(key("a"), vec![("2024-03-01", Some(5.0))])]);
    let buylist = RollingStateStore::new(14, "tcgplayer", "buylist").unwrap();

    let err = buylist
        .ingest(&prior, &HashMap::from([(key("a"), Some(3.0))]), d("2024-03-02"))
        .unwrap_err();

    assert!(matches!(err, TrackerError::Configuration(_)));
    assert!(err.to_string().contains("re-seed"));
}

#[test]
fn empty_prior_takes_the_configured_source() {
    let s = store(14);
    let prior = RollingState::new("cardkingdom", "buylist");

    let state = s
        .ingest(&prior, &HashMap::from([(key("a"), Some(3.0))]), d("2024-03-02"))
        .unwrap();

    assert_eq!(state.provider, "tcgplayer");
    assert_eq!(state.price_type, "retail");
}

// ---------------------------------------------------------------------------
// seed
// ---------------------------------------------------------------------------

fn history(points: &[(&str, f64)]) -> BTreeMap<chrono::NaiveDate, f64> {
    points.iter().map(|(date, price)| (d(date), *price)).collect()
}

#[test]
fn seed_keeps_the_most_recent_priced_dates() {
    let s = store(3);
    let series = HashMap::from([
        (
            key("a"),
            history(&[
                ("2024-03-01", 1.0),
                ("2024-03-02", 2.0),
                ("2024-03-03", 3.0),
                ("2024-03-04", 4.0),
            ]),
        ),
        (foil("a"), history(&[("2024-03-04", 9.0)])),
    ]);

    let state = s.seed(&series, d("2024-03-04"));

    assert_eq!(state.provider, "tcgplayer");
    assert_eq!(
        state.dates(&key("a")),
        vec![d("2024-03-02"), d("2024-03-03"), d("2024-03-04")]
    );
    assert_eq!(state.price_on(&foil("a"), d("2024-03-04")), Some(9.0));
}

#[test]
fn seed_ignores_dates_outside_the_lookback() {
    let s = store(14);
    let as_of = d("2024-06-30");
    let too_old = as_of - chrono::Days::new(SEED_LOOKBACK_DAYS);
    let oldest_kept = as_of - chrono::Days::new(SEED_LOOKBACK_DAYS - 1);
    let series = HashMap::from([
        (key("stale"), BTreeMap::from([(too_old, 4.0)])),
        (
            key("a"),
            BTreeMap::from([(oldest_kept, 5.0), (d("2024-07-01"), 6.0)]),
        ),
    ]);

    let state = s.seed(&series, as_of);

    assert!(!state.contains_key(&key("stale")));
    assert_eq!(state.dates(&key("a")), vec![oldest_kept]);
}

#[test]
fn seed_skips_unusable_prices() {
    let s = store(14);
    let series = HashMap::from([(
        key("a"),
        history(&[("2024-03-01", 0.0), ("2024-03-02", f64::NAN), ("2024-03-03", 2.5)]),
    )]);

    let state = s.seed(&series, d("2024-03-03"));

    assert_eq!(state.dates(&key("a")), vec![d("2024-03-03")]);
}

// ---------------------------------------------------------------------------
// truncation
// ---------------------------------------------------------------------------

#[test]
fn truncation_keeps_exactly_the_most_recent_w_dates() {
    let w = 14;
    let s = store(w);
    let mut state = RollingState::default();
    let start = d("2024-01-01");
    for i in 0..20u64 {
        let date = start + chrono::Days::new(i);
        state = s.ingest(&state, &HashMap::from([(key("a"), Some(i as f64 + 1.0))]), date).unwrap();
        assert!(state.dates(&key("a")).len() <= w);
    }

    let dates = state.dates(&key("a"));
    assert_eq!(dates.len(), w);
    let expected: Vec<_> = (6..20u64).map(|i| start + chrono::Days::new(i)).collect();
    assert_eq!(dates, expected);
}

#[test]
fn truncation_is_per_key() {
    let s = store(3);
    let state = build_state(
        &s,
        &[
            (
                key("old"),
                vec![
                    ("2024-01-01", Some(1.0)),
                    ("2024-01-02", Some(1.0)),
                    ("2024-01-03", Some(1.0)),
                    ("2024-01-04", Some(1.0)),
                ],
            ),
            (key("new"), vec![("2024-01-04", Some(2.0))]),
        ],
    );

    assert_eq!(state.dates(&key("old")).len(), 3);
    assert_eq!(state.dates(&key("old"))[0], d("2024-01-02"));
    assert_eq!(state.dates(&key("new")), vec![d("2024-01-04")]);
}

#[test]
fn backfilling_a_date_older_than_the_window_is_dropped() {
    let s = store(2);
    let state = build_state(
        &s,
        &[(key("a"), vec![("2024-01-05", Some(1.0)), ("2024-01-06", Some(2.0))])],
    );
    let state = s.ingest(&state, &HashMap::from([(key("a"), Some(9.0))]), d("2024-01-01")).unwrap();

    assert_eq!(state.dates(&key("a")), vec![d("2024-01-05"), d("2024-01-06")]);
}

// ---------------------------------------------------------------------------
// window
// ---------------------------------------------------------------------------

#[test]
fn window_returns_today_and_past_prices() {
    let s = store(14);
    let state = build_state(
        &s,
        &[(
            key("a"),
            vec![
                ("2024-03-01", Some(5.0)),
                ("2024-03-02", Some(5.5)),
                ("2024-03-04", Some(7.0)),
            ],
        )],
    );

    assert_eq!(RollingStateStore::window(&state, &key("a"), 3), Some((7.0, 5.0)));
    assert_eq!(
        RollingStateStore::window_at(&state, &key("a"), d("2024-03-02"), 1),
        Some((5.5, 5.0))
    );
}

#[test]
fn window_never_forward_fills_a_missing_day() {
    let s = store(14);
    let state = build_state(
        &s,
        &[(
            key("a"),
            vec![
                ("2024-03-01", Some(5.0)),
                ("2024-03-02", None),
                ("2024-03-03", Some(6.0)),
            ],
        )],
    );

    assert_eq!(RollingStateStore::window(&state, &key("a"), 1), None);
    assert_eq!(RollingStateStore::window(&state, &key("a"), 2), Some((6.0, 5.0)));
}

#[test]
fn window_does_not_substitute_a_nearby_date_for_a_gap() {
    let s = store(14);
    // No entry at all on 2024-03-02.
    let state = build_state(
        &s,
        &[(key("a"), vec![("2024-03-01", Some(5.0)), ("2024-03-03", Some(6.0))])],
    );

    assert_eq!(RollingStateStore::window(&state, &key("a"), 1), None);
}

#[test]
fn window_is_none_when_history_is_too_short() {
    let s = store(14);
    let state = build_state(&s, &[(key("a"), vec![("2024-03-01", Some(5.0))])]);

    assert_eq!(RollingStateStore::window(&state, &key("a"), 1), None);
    assert_eq!(RollingStateStore::window(&state, &key("a"), 7), None);
}

#[test]
fn window_is_none_when_today_is_absent() {
    let s = store(14);
    let state = build_state(
        &s,
        &[(key("a"), vec![("2024-03-01", Some(5.0)), ("2024-03-02", None)])],
    );

    assert_eq!(RollingStateStore::window(&state, &key("a"), 1), None);
}

#[test]
fn window_for_untracked_key_is_none() {
    let state = RollingState::default();
    assert_eq!(RollingStateStore::window(&state, &key("nope"), 1), None);
}
