use super::*;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;

fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .unwrap()
}

fn ledger_with(credits: u64, now: DateTime<Utc>) -> Ledger {
    let rules = GameRules::default();
    let mut record = rules.new_record("W1-wallet-address", now);
    record.credits = credits;
    Ledger::new(record, rules)
}

#[test]
fn test_new_record_defaults() {
    let now = at(2024, 3, 10, 12, 0, 0);
    let record = GameRules::default().new_record("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin", now);
    assert_eq!(record.username, "Player_9xQeWv");
    assert_eq!(record.credits, INITIAL_CREDITS);
    assert_eq!(record.spins_left, DAILY_SPIN_LIMIT);
    assert_eq!(record.last_claim_time, None);
    assert_eq!(
        record.last_spin_reset_date,
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    );
    record
        .validate_invariants(DAILY_SPIN_LIMIT)
        .expect("valid invariants");
}

#[test]
fn test_record_json_shape() {
    let now = at(2024, 3, 10, 12, 0, 0);
    let mut record = GameRules::default().new_record("abc", now);
    record.last_claim_time = Some(now);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["walletAddress"], "abc");
    assert_eq!(json["spinsLeft"], DAILY_SPIN_LIMIT);
    assert_eq!(json["lastSpinResetDate"], "2024-03-10");
    assert_eq!(json["lastClaimTime"], now.timestamp_millis());

    let decoded: PlayerRecord = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn test_record_without_claim_time_decodes() {
    let decoded: PlayerRecord = serde_json::from_str(
        r#"{"walletAddress":"w","username":"u","credits":5,"spinsLeft":2,"lastSpinResetDate":"2024-01-01"}"#,
    )
    .unwrap();
    assert_eq!(decoded.last_claim_time, None);
}

#[test]
fn test_validate_rejects_spins_above_limit() {
    let mut record = GameRules::default().new_record("w", at(2024, 1, 1, 0, 0, 0));
    record.spins_left = DAILY_SPIN_LIMIT + 1;
    assert!(matches!(
        record.validate_invariants(DAILY_SPIN_LIMIT),
        Err(PlayerInvariantError::SpinsOutOfRange { .. })
    ));
}

#[test]
fn test_normalize_username() {
    assert_eq!(normalize_username("  lucky  ").unwrap(), "lucky");
    assert_eq!(normalize_username("   "), Err(PlayerInvariantError::NameEmpty));
    assert!(matches!(
        normalize_username(&"x".repeat(MAX_NAME_LENGTH + 1)),
        Err(PlayerInvariantError::NameTooLong { .. })
    ));
}

#[test]
fn test_update_merge_leaves_missing_fields() {
    let mut record = GameRules::default().new_record("w", at(2024, 1, 1, 0, 0, 0));
    PlayerUpdate::credits(42).merge_into(&mut record);
    assert_eq!(record.credits, 42);
    assert_eq!(record.spins_left, DAILY_SPIN_LIMIT);
    assert_eq!(record.username, "Player_w");
}

#[test]
fn test_segment_effect_examples() {
    assert_eq!(SegmentEffect::Percent(200).apply(100), 300);
    assert_eq!(SegmentEffect::Percent(-80).apply(100), 20);
    assert_eq!(SegmentEffect::Percent(-60).apply(100), 40);
    assert_eq!(SegmentEffect::Percent(30).apply(100), 130);
    assert_eq!(SegmentEffect::Multiplier(2.0).apply(100), 300);
    assert_eq!(SegmentEffect::Multiplier(-0.8).apply(100), 20);
    assert_eq!(SegmentEffect::Percent(-150).apply(100), 0);
    assert_eq!(SegmentEffect::Multiplier(-3.0).apply(100), 0);
    // Half rounds away from zero.
    assert_eq!(SegmentEffect::Percent(30).apply(5), 7);
    assert_eq!(SegmentEffect::Percent(-50).apply(3), 2);
}

#[test]
fn test_segment_effect_display() {
    assert_eq!(SegmentEffect::Percent(200).to_string(), "+200%");
    assert_eq!(SegmentEffect::Percent(-60).to_string(), "-60%");
    assert_eq!(SegmentEffect::Multiplier(0.3).to_string(), "+30%");
}

#[test]
fn test_segment_index_clamps() {
    let wheel = Wheel::default();
    assert_eq!(wheel.segment_count(), 8);
    assert_eq!(wheel.segment_index(1), 0);
    assert_eq!(wheel.segment_index(8), 7);
    assert_eq!(wheel.segment_index(0), 0);
    assert_eq!(wheel.segment_index(9), 7);
    assert_eq!(wheel.segment_index(u64::MAX), 7);
    let (index, segment) = wheel.resolve(1);
    assert_eq!(index, 0);
    assert_eq!(segment.effect, SegmentEffect::Percent(200));
}

#[test]
fn test_wheel_rejects_empty_and_non_finite() {
    assert_eq!(Wheel::new(vec![]), Err(WheelError::Empty));
    let bad = Segment {
        label: "nan".to_string(),
        effect: SegmentEffect::Multiplier(f64::NAN),
    };
    assert_eq!(
        Wheel::new(vec![Segment::percent(10), bad]),
        Err(WheelError::NonFiniteMultiplier { index: 1 })
    );
    assert_eq!(
        Wheel::new(vec![Segment::percent(-150)]),
        Err(WheelError::BeyondTotalLoss { index: 0 })
    );
}

#[test]
fn test_practice_effect_does_not_mutate() {
    let now = at(2024, 1, 1, 9, 0, 0);
    let mut ledger = ledger_with(100, now);
    assert_eq!(
        ledger.apply_segment_effect(SegmentEffect::Percent(-80), false),
        100
    );
    assert_eq!(ledger.credits(), 100);
    assert_eq!(ledger.apply_segment_effect(SegmentEffect::Percent(-80), true), 20);
    assert_eq!(ledger.credits(), 20);
}

#[test]
fn test_daily_spin_limit() {
    let now = at(2024, 1, 1, 9, 0, 0);
    let mut ledger = ledger_with(100, now);
    for expected_left in (0..DAILY_SPIN_LIMIT).rev() {
        assert_eq!(ledger.consume_daily_spin(now), Ok(expected_left));
    }
    assert_eq!(
        ledger.consume_daily_spin(now),
        Err(LedgerError::LimitExceeded {
            limit: DAILY_SPIN_LIMIT,
            resets_at: at(2024, 1, 2, 0, 0, 0),
        })
    );
    assert_eq!(ledger.spins_left(), 0);
    assert_eq!(ledger.spins_used_today(), DAILY_SPIN_LIMIT);
}

#[test]
fn test_roll_over_is_idempotent_within_day() {
    let day_one = at(2024, 1, 1, 23, 59, 0);
    let mut ledger = ledger_with(100, day_one);
    ledger.consume_daily_spin(day_one).unwrap();
    ledger.consume_daily_spin(day_one).unwrap();
    assert!(!ledger.roll_over(day_one));
    assert_eq!(ledger.spins_used_today(), 2);

    let day_two = at(2024, 1, 2, 0, 0, 1);
    assert!(ledger.roll_over(day_two));
    assert_eq!(ledger.spins_used_today(), 0);
    ledger.consume_daily_spin(day_two).unwrap();
    assert!(!ledger.roll_over(at(2024, 1, 2, 18, 0, 0)));
    assert_eq!(ledger.spins_used_today(), 1);
}

#[test]
fn test_roll_over_never_regresses_date() {
    let later = at(2024, 5, 5, 12, 0, 0);
    let mut ledger = ledger_with(100, later);
    ledger.consume_daily_spin(later).unwrap();
    assert!(!ledger.roll_over(at(2024, 5, 4, 12, 0, 0)));
    assert_eq!(
        ledger.record().last_spin_reset_date,
        NaiveDate::from_ymd_opt(2024, 5, 5).unwrap()
    );
    assert_eq!(ledger.spins_used_today(), 1);
}

#[test]
fn test_claim_cooldown() {
    let now = at(2024, 1, 1, 9, 0, 0);
    let mut ledger = ledger_with(0, now);
    assert_eq!(ledger.claim(now), Ok(CLAIM_AMOUNT));
    assert_eq!(ledger.credits(), CLAIM_AMOUNT);

    let err = ledger.claim(now).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::CooldownActive {
            remaining_secs: CLAIM_COOLDOWN_SECS,
            ..
        }
    ));

    let later = now + TimeDelta::seconds(CLAIM_COOLDOWN_SECS + 1);
    assert_eq!(ledger.claim(later), Ok(CLAIM_AMOUNT));
    assert_eq!(ledger.credits(), 2 * CLAIM_AMOUNT);
    assert_eq!(ledger.record().last_claim_time, Some(later));
}

#[test]
fn test_calendar_keys() {
    assert_eq!(
        utc_day(at(2024, 2, 29, 23, 59, 59)),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert_eq!(next_daily_reset(at(2024, 2, 29, 23, 59, 59)), at(2024, 3, 1, 0, 0, 0));
    assert_eq!(iso_week_key(at(2024, 1, 1, 0, 0, 0)), "2024-W01");
    // 2024-12-30 belongs to ISO week 1 of 2025.
    assert_eq!(iso_week_key(at(2024, 12, 30, 8, 0, 0)), "2025-W01");
    assert_eq!(iso_week_key(at(2021, 1, 3, 8, 0, 0)), "2020-W53");
}

#[test]
fn test_standing_order_and_search() {
    let mut standings = vec![("a", 10u64), ("c", 30), ("b", 30), ("d", 5)];
    standings.sort_by(|x, y| standing_order(*x, *y));
    assert_eq!(standings, vec![("c", 30), ("b", 30), ("a", 10), ("d", 5)]);
    assert!(matches_search("luck", "wallet", "LuckyOne"));
    assert!(matches_search("abc", "xxABCxx", "name"));
    assert!(!matches_search("zzz", "wallet", "name"));
    assert_eq!(rank_at(0), 1);
}

proptest! {
    #[test]
    fn prop_effect_never_negative_and_bounded(balance in 0u64..=1_000_000_000_000, percent in -1_000i32..=1_000) {
        let next = SegmentEffect::Percent(percent).apply(balance);
        if percent <= -100 {
            prop_assert_eq!(next, 0);
        }
        if percent >= 0 {
            prop_assert!(next >= balance);
        } else {
            prop_assert!(next <= balance);
        }
    }

    #[test]
    fn prop_percent_matches_multiplier_away_from_half(balance in 0u64..=1_000_000, percent in -300i32..=300) {
        // Skip exact halves where float error can flip the rounding direction.
        prop_assume!((balance as i128 * (100 + percent as i128)).rem_euclid(100) != 50);
        let exact = SegmentEffect::Percent(percent).apply(balance);
        let float = SegmentEffect::Multiplier(percent as f64 / 100.0).apply(balance);
        prop_assert_eq!(exact, float);
    }

    #[test]
    fn prop_roll_over_twice_same_day(hour in 0u32..24, used in 0u32..=DAILY_SPIN_LIMIT) {
        let now = at(2024, 6, 1, hour, 0, 0);
        let mut ledger = ledger_with(100, at(2024, 5, 31, 12, 0, 0));
        ledger.roll_over(now);
        for _ in 0..used {
            ledger.consume_daily_spin(now).unwrap();
        }
        prop_assert!(!ledger.roll_over(now));
        prop_assert_eq!(ledger.spins_used_today(), used);
    }

    #[test]
    fn prop_segment_index_in_range(raw in any::<u64>()) {
        let wheel = Wheel::default();
        prop_assert!(wheel.segment_index(raw) < wheel.segments().len());
    }
}
