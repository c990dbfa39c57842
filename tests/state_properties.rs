//! Property tests for the reducer/version-monotonicity invariants: token
//! accounting never exceeds the accumulated total, and the append-only
//! message/error logs are always prefix-extensions of themselves over time.

use pipeline_engine::channels::token_usage::TokenUsage;
use pipeline_engine::channels::errors::{ErrorEvent, LadderError};
use pipeline_engine::message::Message;
use pipeline_engine::node::NodePartial;
use pipeline_engine::reducers::{AddErrors, AddMessages, Reducer, SumTokenUsage, WriteStageSlot};
use pipeline_engine::state::RunState;
use pipeline_engine::types::StageSlot;
use proptest::prelude::*;

proptest! {
    /// Invariant 1: after any sequence of token deltas, the accumulated
    /// total equals the sum of deltas applied — in particular it never
    /// exceeds it, since every delta is non-negative.
    #[test]
    fn token_totals_never_exceed_sum_of_deltas(deltas in proptest::collection::vec((0u64..10_000, 0u64..10_000), 0..20)) {
        let mut state = RunState::new_feature_run("prop");
        let mut expected_total: u64 = 0;

        for (input, output) in &deltas {
            let delta = TokenUsage::new(*input, *output);
            expected_total += delta.total;
            let update = NodePartial::new().with_tokens(delta);
            SumTokenUsage.apply(&mut state, &update).unwrap();
            let observed = state.snapshot().token_usage.total;
            prop_assert!(observed <= expected_total);
            prop_assert_eq!(observed, expected_total);
        }
    }

    /// Invariant 3 (messages): the message log observed after applying N
    /// updates is always a prefix-extension of the log observed after N-1.
    #[test]
    fn messages_are_monotonic_prefix_extensions(batches in proptest::collection::vec(proptest::collection::vec("[a-z]{1,8}", 0..4), 0..10)) {
        let mut state = RunState::new_feature_run("prop");
        let mut previous: Vec<String> = Vec::new();

        for batch in &batches {
            let messages: Vec<Message> = batch.iter().map(|text| Message::assistant(text)).collect();
            let update = NodePartial::new().with_messages(messages);
            let _ = AddMessages.apply(&mut state, &update);

            let current: Vec<String> = state
                .snapshot()
                .messages
                .iter()
                .map(|m| m.content.clone())
                .collect();
            prop_assert!(current.len() >= previous.len());
            prop_assert_eq!(&current[..previous.len()], &previous[..]);
            previous = current;
        }
    }

    /// Invariant 3 (errors): same monotonic prefix-extension property for
    /// the append-only error log.
    #[test]
    fn errors_are_monotonic_prefix_extensions(counts in proptest::collection::vec(0usize..4, 0..10)) {
        let mut state = RunState::new_feature_run("prop");
        let mut previous_len = 0usize;

        for (step, count) in counts.iter().enumerate() {
            let errors: Vec<ErrorEvent> = (0..*count)
                .map(|i| ErrorEvent::stage("develop", step as u32, LadderError::msg(format!("err-{step}-{i}"))))
                .collect();
            let update = NodePartial::new().with_errors(errors);
            let _ = AddErrors.apply(&mut state, &update);

            let current_len = state.snapshot().errors.len();
            prop_assert!(current_len >= previous_len);
            previous_len = current_len;
        }
    }

    /// Round-trip law: writing a stage's output then reading it back via a
    /// fresh snapshot returns the same value unchanged, for any JSON-ish
    /// payload and any slot.
    #[test]
    fn stage_output_round_trips(slot_index in 0usize..7, summary in "[a-zA-Z0-9 ]{0,32}", count in 0u64..1000) {
        let slots = [
            StageSlot::Analysis,
            StageSlot::Planning,
            StageSlot::Development,
            StageSlot::Testing,
            StageSlot::Review,
            StageSlot::Deployment,
            StageSlot::Monitoring,
        ];
        let slot = slots[slot_index];
        let value = serde_json::json!({"summary": summary, "count": count});

        let mut state = RunState::new_feature_run("prop");
        let update = NodePartial::new().with_stage_output(slot, value.clone());
        WriteStageSlot.apply(&mut state, &update).unwrap();

        prop_assert_eq!(state.snapshot().stage_outputs.get(&slot), Some(&value));
    }
}
