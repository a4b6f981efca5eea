//! Property-based test generators using proptest.
//!
//! `TallyOp` mirrors the fixture actions as plain data, so a test can apply
//! an op list both through the engine and through the reference model in
//! [`TallyOp::apply_to`] and compare the results.

use crate::fixtures::{add, note, set, Tally};
use mailroom_core::Action;
use proptest::prelude::*;

/// Strategy for a single counter delta.
pub fn delta_strategy() -> impl Strategy<Value = i64> {
    -1_000i64..1_000
}

/// Strategy for a list of deltas.
pub fn delta_list_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(delta_strategy(), 0..max_len)
}

/// Strategy for store keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// A fixture action as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyOp {
    /// See [`add`].
    Add(i64),
    /// See [`set`].
    Set(i64),
    /// See [`note`].
    Note(String),
}

impl TallyOp {
    /// Builds the matching action.
    pub fn to_action(&self) -> Action<Tally> {
        match self {
            TallyOp::Add(n) => add(*n),
            TallyOp::Set(n) => set(*n),
            TallyOp::Note(tag) => note(tag),
        }
    }

    /// Applies the op directly, without the engine.
    pub fn apply_to(&self, tally: &mut Tally) {
        match self {
            TallyOp::Add(n) => {
                tally.count += n;
                tally.log.push(format!("+{n}"));
            }
            TallyOp::Set(n) => {
                tally.count = *n;
                tally.log.push(format!("={n}"));
            }
            TallyOp::Note(tag) => tally.log.push(tag.clone()),
        }
    }
}

/// Converts ops to actions.
pub fn to_actions(ops: &[TallyOp]) -> Vec<Action<Tally>> {
    ops.iter().map(TallyOp::to_action).collect()
}

/// Applies ops through the reference model.
pub fn apply_model(start: &Tally, ops: &[TallyOp]) -> Tally {
    let mut tally = start.clone();
    for op in ops {
        op.apply_to(&mut tally);
    }
    tally
}

/// Strategy for a single op.
pub fn tally_op_strategy() -> impl Strategy<Value = TallyOp> {
    prop_oneof![
        4 => delta_strategy().prop_map(TallyOp::Add),
        1 => delta_strategy().prop_map(TallyOp::Set),
        1 => prop::string::string_regex("[a-z]{1,6}")
            .expect("Invalid regex")
            .prop_map(TallyOp::Note),
    ]
}

/// Strategy for an op list.
pub fn op_sequence_strategy(min_ops: usize, max_ops: usize) -> impl Strategy<Value = Vec<TallyOp>> {
    prop::collection::vec(tally_op_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Few cases; suits async property tests that build a runtime per case.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
