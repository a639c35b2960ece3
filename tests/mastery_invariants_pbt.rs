//! Property-based tests for the scheduler and aggregator invariants:
//! - counters stay consistent and the level equals correct/attempted
//! - the best streak never decreases
//! - the ease factor never drops below 1.3
//! - failing qualities reset the repetition ladder
//! - the mastered flag always matches the level threshold

mod common;

use chrono::Duration;
use proptest::prelude::*;

use mastery_engine::db::MasteryRecord;
use mastery_engine::services::mastery::{record_answer, summarize, AnswerEvent, MASTERY_THRESHOLD};
use mastery_engine::services::sm2::{update_parameters, Sm2State, MIN_EASE_FACTOR};
use mastery_engine::services::zpd::{difficulty_for_record, MAX_DIFFICULTY, MIN_DIFFICULTY};

use common::{fixed_now, SESSION};

fn arb_event() -> impl Strategy<Value = AnswerEvent> {
    (any::<bool>(), 0u32..=400u32, any::<bool>()).prop_map(|(is_correct, seconds, had_hint)| {
        AnswerEvent {
            is_correct,
            time_taken_seconds: f64::from(seconds),
            had_hint,
        }
    })
}

fn arb_sm2_state() -> impl Strategy<Value = Sm2State> {
    (130u32..=400u32, 1u32..=1000u32, 0u32..=30u32).prop_map(|(ease, interval_days, repetitions)| {
        Sm2State {
            ease_factor: f64::from(ease) / 100.0,
            interval_days,
            repetitions,
        }
    })
}

proptest! {
    #[test]
    fn prop_answer_history_invariants(events in prop::collection::vec(arb_event(), 1..60)) {
        let mut record = MasteryRecord::new(SESSION, "concept", fixed_now());
        let mut now = fixed_now();
        let mut previous_best = 0;

        for event in &events {
            let quality = record_answer(&mut record, event, 60.0, now);

            prop_assert!(record.questions_correct <= record.questions_attempted);
            let expected_level =
                f64::from(record.questions_correct) / f64::from(record.questions_attempted);
            prop_assert!((record.current_level - expected_level).abs() < 1e-12);

            prop_assert!(record.streak_best >= previous_best);
            prop_assert!(record.streak_best >= record.streak_current);
            previous_best = record.streak_best;

            prop_assert!(record.ease_factor >= MIN_EASE_FACTOR);
            prop_assert!(record.interval_days >= 1);
            if quality < 3 {
                prop_assert_eq!(record.repetitions, 0);
                prop_assert_eq!(record.interval_days, 1);
            }

            prop_assert_eq!(record.is_mastered, record.current_level >= MASTERY_THRESHOLD);
            prop_assert_eq!(
                record.next_review_due,
                now + Duration::days(i64::from(record.interval_days))
            );
            prop_assert!(!record.needs_review);

            now += Duration::hours(1);
        }

        prop_assert_eq!(record.questions_attempted as usize, events.len());
    }

    #[test]
    fn prop_ease_floor_and_reset(state in arb_sm2_state(), quality in 0u8..=5u8) {
        let next = update_parameters(quality, state);
        prop_assert!(next.ease_factor >= MIN_EASE_FACTOR);
        prop_assert!(next.interval_days >= 1);
        if quality < 3 {
            prop_assert_eq!(next.repetitions, 0);
            prop_assert_eq!(next.interval_days, 1);
        } else {
            prop_assert_eq!(next.repetitions, state.repetitions + 1);
        }
    }

    #[test]
    fn prop_difficulty_stays_in_range(attempted in 0u32..200u32, correct_share in 0u32..=100u32) {
        let correct = attempted * correct_share / 100;
        let mut record = MasteryRecord::new(SESSION, "concept", fixed_now());
        record.questions_attempted = attempted;
        record.questions_correct = correct;
        record.current_level = record.success_rate();

        let difficulty = difficulty_for_record(Some(&record));
        prop_assert!((MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty));
    }

    #[test]
    fn prop_summary_counts_partition_records(
        levels in prop::collection::vec(0u32..=100u32, 0..40)
    ) {
        let records: Vec<MasteryRecord> = levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                let mut record = MasteryRecord::new(SESSION, format!("c{i}"), fixed_now());
                record.current_level = f64::from(*level) / 100.0;
                record
            })
            .collect();

        let summary = summarize(&records, fixed_now());
        prop_assert_eq!(summary.total_concepts, records.len());
        prop_assert_eq!(
            summary.mastered + summary.proficient + summary.developing + summary.struggling,
            records.len()
        );
        prop_assert!(summary.overall_mastery.is_finite());
        prop_assert!((0.0..=1.0).contains(&summary.overall_mastery));
    }
}
