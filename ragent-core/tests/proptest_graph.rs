//! Property-based tests for turn state, routing, and reply parsing.

use proptest::prelude::*;

use ragent_core::graph::steps::{final_output, format_context, receive_question};
use ragent_core::graph::{
    AnswerVerdict, Route, SearchDecision, TurnState, route_after_decision,
    route_after_evaluation,
};
use ragent_core::store::Passage;
use ragent_core::types::Message;

fn transcript() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(".{0,40}", 0..8)
}

fn state_from(texts: &[String]) -> TurnState {
    let messages = texts
        .iter()
        .enumerate()
        .map(|(i, t)| {
            if i % 2 == 0 {
                Message::user(t.as_str())
            } else {
                Message::assistant(t.as_str())
            }
        })
        .collect();
    TurnState::new(messages)
}

// --- Question extraction ---

proptest! {
    #[test]
    fn question_is_last_message_content(texts in transcript()) {
        let mut state = state_from(&texts);
        receive_question(&mut state);
        let expected = texts.last().cloned().unwrap_or_default();
        prop_assert_eq!(state.question, expected);
        prop_assert_eq!(state.messages.len(), texts.len());
    }
}

// --- Decision routing ---

proptest! {
    #[test]
    fn decision_routing_is_total(raw in ".{0,24}") {
        let mut state = TurnState::default();
        state.decision = Some(SearchDecision::from_model_output(&raw));
        let route = route_after_decision(&state);
        prop_assert!(route == Route::Retrieve || route == Route::GenerateAnswer);
        prop_assert_eq!(
            route == Route::Retrieve,
            SearchDecision::parse(&raw) == Some(SearchDecision::Search)
        );
    }

    #[test]
    fn decision_ignores_padding_and_case(
        lead in "[ \t\n]{0,3}",
        trail in "[ \t\n]{0,3}",
        upper in any::<bool>(),
        token in prop::sample::select(vec!["search", "no_search"]),
    ) {
        let token = if upper { token.to_uppercase() } else { token.to_string() };
        let raw = format!("{lead}{token}{trail}");
        let expected = if token.eq_ignore_ascii_case("search") {
            SearchDecision::Search
        } else {
            SearchDecision::NoSearch
        };
        prop_assert_eq!(SearchDecision::parse(&raw), Some(expected));
    }
}

// --- Evaluation routing ---

proptest! {
    #[test]
    fn evaluation_without_budget_always_finishes(raw in ".{0,16}") {
        let mut state = TurnState::default();
        state.evaluation = AnswerVerdict::parse(&raw);
        prop_assert_eq!(route_after_evaluation(&state), Route::FinalOutput);
    }

    #[test]
    fn evaluation_regenerates_only_on_bad(budget in 0usize..4, bad in any::<bool>()) {
        let verdict = if bad { AnswerVerdict::Bad } else { AnswerVerdict::Good };
        let mut state = TurnState::default().with_regenerations(budget);
        state.evaluation = Some(verdict);
        let expected = if bad && budget > 0 { Route::Regenerate } else { Route::FinalOutput };
        prop_assert_eq!(route_after_evaluation(&state), expected);
    }
}

// --- Answer recording and finalisation ---

proptest! {
    #[test]
    fn repeated_answers_leave_one_assistant_message(
        texts in transcript(),
        answers in prop::collection::vec(".{0,20}", 1..5),
    ) {
        let mut state = state_from(&texts);
        let before = state.assistant_count();
        for answer in &answers {
            state.set_answer(answer.as_str());
        }
        prop_assert_eq!(state.assistant_count(), before + 1);
        prop_assert_eq!(state.messages.len(), texts.len() + 1);
        prop_assert_eq!(state.answer(), answers.last().map(|a| a.as_str()));
    }

    #[test]
    fn final_output_is_idempotent(texts in transcript(), answer in ".{0,20}") {
        let mut state = state_from(&texts);
        state.set_answer(answer.as_str());
        let before = serde_json::to_string(&state).unwrap();
        final_output(&mut state);
        final_output(&mut state);
        prop_assert_eq!(serde_json::to_string(&state).unwrap(), before);
    }
}

// --- Context assembly ---

proptest! {
    #[test]
    fn context_joins_passages_in_order(texts in prop::collection::vec("[a-z ]{1,20}", 0..5)) {
        let passages: Vec<Passage> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Passage::new(format!("p{i}"), t.as_str()))
            .collect();
        let context = format_context(&passages);
        prop_assert_eq!(context.is_empty(), texts.is_empty() || texts.iter().all(|t| t.is_empty()));
        prop_assert_eq!(context, texts.join("\n\n"));
    }
}
