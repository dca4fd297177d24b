//! Property tests for session state monotonicity.
//!
//! Invariants over arbitrary transition sequences:
//! - stage indices never decrease
//! - percent never decreases within a stage
//! - terminal states are absorbing

use proptest::prelude::*;

use crate::pipeline::{Session, Stage};

const STAGES: [Stage; 17] = [
    Stage::Created,
    Stage::Uploaded,
    Stage::Identifying,
    Stage::Identified,
    Stage::DedupCheck,
    Stage::Extracting,
    Stage::Enhancing,
    Stage::Categorizing,
    Stage::Scoring,
    Stage::NovelCharacters,
    Stage::Persisting,
    Stage::Completed,
    Stage::FailedIdentification,
    Stage::FailedExtraction,
    Stage::FailedPersistence,
    Stage::RejectedDuplicate,
    Stage::Cancelled,
];

fn arb_transition() -> impl Strategy<Value = (Stage, u8)> {
    (0usize..STAGES.len(), 0u8..=110).prop_map(|(i, p)| (STAGES[i], p))
}

proptest! {
    #[test]
    fn stage_trace_is_monotone(transitions in proptest::collection::vec(arb_transition(), 0..40)) {
        let session = Session::new("prop.pdf".into(), vec![]);
        let mut last_index = session.stage().index();
        let mut last = (session.stage(), session.snapshot().percent);
        let mut terminal_stage: Option<Stage> = None;

        for (stage, percent) in transitions {
            session.transition(stage, percent, None);
            let snapshot = session.snapshot();

            // Stage index never decreases.
            prop_assert!(snapshot.stage.index() >= last_index);
            last_index = snapshot.stage.index();

            // Percent never decreases within an unchanged stage.
            if snapshot.stage == last.0 {
                prop_assert!(snapshot.percent >= last.1);
            }
            last = (snapshot.stage, snapshot.percent);

            // Terminal states absorb everything after them.
            if let Some(terminal) = terminal_stage {
                prop_assert_eq!(snapshot.stage, terminal);
            } else if snapshot.stage.is_terminal() {
                terminal_stage = Some(snapshot.stage);
            }
        }
    }

    #[test]
    fn percent_is_capped(percent in 0u8..=255) {
        let session = Session::new("prop.pdf".into(), vec![]);
        session.transition(Stage::Extracting, percent, None);
        prop_assert!(session.snapshot().percent <= 100);
    }
}
