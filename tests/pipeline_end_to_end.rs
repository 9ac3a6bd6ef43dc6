use decay_join::{
    final_filter, group_by_key, CatalogSpec, Event, EventKind, GroupingKeyError, Interval,
    PipelineComposer, PipelineConfig, PipelineError, StageConfig, UnknownEventPolicy,
};
use regex::Regex;

const BASE_MS: i64 = 1_700_000_000_000;
const HOUR_MS: i64 = 3_600_000;

fn ids(event: Event, host: &str, member: &str, livestream: &str) -> Event {
    event
        .with_field("hostId", host)
        .with_field("memberId", member)
        .with_field("livestreamId", livestream)
}

fn reference_events() -> Vec<Event> {
    vec![
        ids(
            Event::new(EventKind::ViewEnd, BASE_MS).with_field("duration_ms", 120_000_i64),
            "h1",
            "m1",
            "l1",
        ),
        ids(
            Event::new(EventKind::Like, BASE_MS + 1_000).with_field("like_counter", 3_i64),
            "h1",
            "m2",
            "l1",
        ),
        ids(
            Event::new(EventKind::Gift, BASE_MS + 2_000)
                .with_field("gift_quantity", 2_i64)
                .with_field("gift_cheers_value", 50_i64),
            "h2",
            "m1",
            "l2",
        ),
        ids(Event::new(EventKind::Share, BASE_MS + 3_000), "h1", "m1", "l1"),
        ids(Event::new(EventKind::Comment, BASE_MS + 4_000), "h2", "m2", "l2"),
        ids(
            Event::new(EventKind::TimespentTarget, BASE_MS + 5 * 24 * HOUR_MS),
            "h1",
            "m1",
            "l1",
        ),
        ids(
            Event::new(EventKind::TimespentTarget, BASE_MS + 6 * 24 * HOUR_MS),
            "h2",
            "m2",
            "l2",
        ),
    ]
}

#[test]
fn reference_pipeline_emits_only_fully_enriched_targets() {
    let composer = PipelineComposer::new(PipelineConfig::default()).unwrap();
    let (targets, report) = composer.run(reference_events()).unwrap();

    assert_eq!(targets.len(), 2);
    assert_eq!(report.output_targets, 2);
    assert_eq!(report.stages.len(), 12);
    for target in &targets {
        assert!(target.is_target());
        assert_eq!(target.feature_names().count(), 84);
    }

    let expected: Vec<String> = composer.feature_names();
    let mut sorted_expected = expected.clone();
    sorted_expected.sort();
    let actual: Vec<String> = targets[0].feature_names().map(str::to_string).collect();
    assert_eq!(actual, sorted_expected);
}

#[test]
fn reference_pipeline_sees_delayed_activity() {
    let composer = PipelineComposer::new(PipelineConfig::default()).unwrap();
    let (targets, _) = composer.run(reference_events()).unwrap();

    let h1 = targets
        .iter()
        .find(|target| target.get_str("hostId") == Some("h1"))
        .unwrap();
    let long_session = h1
        .get_float("feature_hostId_24h0m0s_lives_count_720h0m0s")
        .unwrap();
    let shares = h1
        .get_float("feature_hostId_memberId_1m0s_shares_720h0m0s")
        .unwrap();
    let likes = h1
        .get_float("feature_livestreamId_1h0m0s_like_count_720h0m0s")
        .unwrap();
    let other_host_gifts = h1
        .get_float("feature_hostId_1m0s_gift_value_720h0m0s")
        .unwrap();

    // Snapshots hold each counter as of its last update.
    assert_eq!(long_session, 1.0);
    assert_eq!(shares, 1.0);
    assert_eq!(likes, 3.0);
    assert_eq!(other_host_gifts, 0.0);
}

#[test]
fn stage_delays_accumulate_on_sources() {
    let config = PipelineConfig {
        stages: vec![
            StageConfig::new(["hostId"], Interval::from_hours(1)),
            StageConfig::new(["memberId"], Interval::from_minutes(1)),
        ],
        required_ingest_field: None,
        ..PipelineConfig::default()
    };
    let composer = PipelineComposer::new(config).unwrap();

    let like = |member: &str, count: i64| {
        Event::new(EventKind::Like, 0)
            .with_field("hostId", "h1")
            .with_field("memberId", member)
            .with_field("like_counter", count)
    };
    let target = Event::new(EventKind::TimespentTarget, 10 * HOUR_MS)
        .with_field("hostId", "h1")
        .with_field("memberId", "m1");

    let input = vec![like("m1", 1), like("m2", 4), target];
    let (first_stage, _) = composer.run_stage(0, input.clone()).unwrap();
    let (second_stage, _) = composer.run_stage(1, first_stage).unwrap();
    let shifted: Vec<i64> = second_stage
        .iter()
        .filter(|event| !event.is_target())
        .map(|event| event.event_time_ms)
        .collect();
    assert_eq!(shifted, vec![HOUR_MS + 60_000, HOUR_MS + 60_000]);

    let (targets, report) = composer.run(input).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(report.stages[0].groups, 1);
    assert_eq!(report.stages[1].groups, 2);

    let target = &targets[0];
    assert_eq!(target.event_time_ms, 10 * HOUR_MS);
    assert_eq!(target.feature_names().count(), 14);
    assert_eq!(
        target.get_float("feature_hostId_1h0m0s_like_count_720h0m0s"),
        Some(5.0)
    );
    assert_eq!(
        target.get_float("feature_memberId_1m0s_like_count_720h0m0s"),
        Some(1.0)
    );
}

#[test]
fn missing_grouping_field_fails_the_run() {
    let config = PipelineConfig {
        stages: vec![StageConfig::new(["hostId"], Interval::from_hours(1))],
        required_ingest_field: None,
        ..PipelineConfig::default()
    };
    let composer = PipelineComposer::new(config).unwrap();
    let orphan = Event::new(EventKind::Share, 10).with_field("memberId", "m1");

    let err = composer.run(vec![orphan]).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::GroupingKey(GroupingKeyError::MissingField { ref field }) if field == "hostId"
    ));
}

#[test]
fn ingest_filter_drops_records_without_the_required_field() {
    let config = PipelineConfig {
        stages: vec![StageConfig::new(["hostId"], Interval::from_minutes(1))],
        required_ingest_field: Some("livestreamId".to_string()),
        ..PipelineConfig::default()
    };
    let composer = PipelineComposer::new(config).unwrap();

    let kept = Event::new(EventKind::Share, 10)
        .with_field("hostId", "h1")
        .with_field("livestreamId", "l1");
    let dropped = Event::new(EventKind::Share, 20);
    let target = Event::new(EventKind::TimespentTarget, 5 * 60_000)
        .with_field("hostId", "h1")
        .with_field("livestreamId", "l1");

    let (targets, report) = composer.run(vec![kept, dropped, target]).unwrap();
    assert_eq!(report.ingested, 3);
    assert_eq!(report.ingest_filtered, 1);
    assert_eq!(report.stages[0].input_records, 2);
    assert_eq!(
        targets[0].get_float("feature_hostId_1m0s_shares_720h0m0s"),
        Some(1.0)
    );
}

#[test]
fn target_start_and_unknown_policy_flow_from_config() {
    let config = PipelineConfig {
        stages: vec![StageConfig::new(["hostId"], Interval::ZERO)],
        unknown_events: UnknownEventPolicy::PassThrough,
        target_start_ms: Some(1_000),
        required_ingest_field: None,
        ..PipelineConfig::default()
    };
    let composer = PipelineComposer::new(config).unwrap();

    let input = vec![
        Event::new(EventKind::parse("follow"), 10).with_field("hostId", "h1"),
        Event::new(EventKind::TimespentTarget, 500).with_field("hostId", "h1"),
        Event::new(EventKind::TimespentTarget, 1_500).with_field("hostId", "h1"),
    ];
    let (targets, report) = composer.run(input).unwrap();

    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].event_time_ms, 1_500);
    assert_eq!(report.stages[0].pass.targets_dropped, 1);
    assert_eq!(report.stages[0].pass.unknown_forwarded, 1);
}

#[test]
fn runs_are_deterministic() {
    let composer = PipelineComposer::new(PipelineConfig::default()).unwrap();
    let mut reversed = reference_events();
    reversed.reverse();

    let (first, first_report) = composer.run(reference_events()).unwrap();
    let (second, second_report) = composer.run(reference_events()).unwrap();
    let (third, _) = composer.run(reversed).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_report, second_report);

    let mut first_sorted = first.clone();
    first_sorted.sort_by_key(|event| event.event_time_ms);
    let mut third_sorted = third;
    third_sorted.sort_by_key(|event| event.event_time_ms);
    assert_eq!(first_sorted, third_sorted);
}

#[test]
fn feature_names_follow_the_naming_scheme() {
    let pattern =
        Regex::new(r"^feature_[A-Za-z_]+_(\d+h)?(\d+m)?\d+s_[a-z_]+_720h0m0s$").unwrap();
    let composer = PipelineComposer::new(PipelineConfig::default()).unwrap();

    for name in composer.feature_names() {
        assert!(pattern.is_match(&name), "unexpected feature name {name}");
    }
}

#[test]
fn additional_windows_multiply_the_catalog() {
    let config = PipelineConfig {
        stages: vec![StageConfig::new(["hostId"], Interval::from_hours(1))],
        catalog: CatalogSpec::with_windows(&[Interval::from_days(1), Interval::from_days(30)]),
        ..PipelineConfig::default()
    };
    let composer = PipelineComposer::new(config).unwrap();
    let names = composer.feature_names();

    assert_eq!(names.len(), 14);
    assert!(names.contains(&"feature_hostId_1h0m0s_like_count_24h0m0s".to_string()));
    assert!(names.contains(&"feature_hostId_1h0m0s_like_count_720h0m0s".to_string()));
}

#[test]
fn out_of_range_stage_is_a_config_error() {
    let composer = PipelineComposer::new(PipelineConfig::default()).unwrap();
    assert!(matches!(
        composer.run_stage(12, Vec::new()),
        Err(PipelineError::InvalidConfig(_))
    ));
}

#[test]
fn reference_config_drops_records_without_livestream() {
    let composer = PipelineComposer::new(PipelineConfig::default()).unwrap();
    let mut input = reference_events();
    input.push(
        Event::new(EventKind::Share, BASE_MS + 5_000)
            .with_field("hostId", "h1")
            .with_field("memberId", "m1"),
    );

    let (targets, report) = composer.run(input).unwrap();
    assert_eq!(report.ingested, 8);
    assert_eq!(report.ingest_filtered, 1);
    assert_eq!(targets.len(), 2);
    let h1 = targets
        .iter()
        .find(|target| target.get_str("hostId") == Some("h1"))
        .unwrap();
    assert_eq!(
        h1.get_float("feature_hostId_1m0s_shares_720h0m0s"),
        Some(1.0)
    );
}

#[test]
fn final_rows_match_the_last_stage_enriched_output() {
    let config = PipelineConfig {
        stages: vec![
            StageConfig::new(["hostId"], Interval::from_hours(1)),
            StageConfig::new(["memberId"], Interval::from_minutes(1)),
        ],
        ..PipelineConfig::default()
    };
    let composer = PipelineComposer::new(config).unwrap();
    let input = reference_events();

    let (first_stage, _) = composer.run_stage(0, input.clone()).unwrap();
    let last = &composer.config().stages[1];
    let reducer = composer.reducer(last);
    let mut chained: Vec<Event> = Vec::new();
    let mut enriched: Vec<Event> = Vec::new();
    for (group_key, records) in group_by_key(first_stage, &last.extractor()).unwrap() {
        reducer
            .reduce(&group_key, records, &mut chained, &mut enriched)
            .unwrap();
    }

    let (targets, _) = composer.run(input).unwrap();
    assert_eq!(final_filter(chained), enriched);
    assert_eq!(targets, enriched);
}
