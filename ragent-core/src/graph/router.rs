//! Conditional edges of the turn graph.

use super::state::{AnswerVerdict, SearchDecision, TurnState};

/// Target of a conditional edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Retrieve,
    GenerateAnswer,
    FinalOutput,
    Regenerate,
}

impl Route {
    /// Label shown on the edge in diagrams.
    pub fn label(&self) -> &'static str {
        match self {
            Route::Retrieve => "retrieve",
            Route::GenerateAnswer => "generate_answer",
            Route::FinalOutput => "final_output",
            Route::Regenerate => "regenerate",
        }
    }
}

/// After `should_search`: retrieve only for an explicit `SEARCH` decision.
pub fn route_after_decision(state: &TurnState) -> Route {
    match state.decision {
        Some(SearchDecision::Search) => Route::Retrieve,
        Some(SearchDecision::NoSearch) | None => Route::GenerateAnswer,
    }
}

/// After `evaluate_answer`: regenerate only on `BAD` while budget remains.
pub fn route_after_evaluation(state: &TurnState) -> Route {
    match state.evaluation {
        Some(AnswerVerdict::Bad) if state.regenerations_remaining > 0 => Route::Regenerate,
        _ => Route::FinalOutput,
    }
}
