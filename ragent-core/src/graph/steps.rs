//! The six node bodies of the turn graph.
//!
//! Each step reads and writes `TurnState` only; capability errors propagate
//! unchanged to the executor.

use super::state::{AnswerVerdict, SearchDecision, TurnState};
use crate::brain::Brain;
use crate::error::Result;
use crate::prompts::{
    EVALUATE_ANSWER, GROUNDED_ANSWER, PromptTemplate, SHOULD_SEARCH, UNGROUNDED_ANSWER,
};
use crate::store::{Passage, VectorStore};
use serde_json::json;
use tracing::{debug, info, warn};

/// Separator placed between retrieved passages in `context`.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

/// Set `question` to the content of the last message (empty if there is none).
pub fn receive_question(state: &mut TurnState) {
    state.question = state
        .messages
        .last()
        .map(|m| m.content.clone())
        .unwrap_or_default();
    debug!(node = "receive_question", chars = state.question.chars().count(), "Question extracted");
}

/// Ask the model whether the question needs document search.
pub async fn should_search(state: &mut TurnState, brain: &Brain) -> Result<()> {
    debug!(node = "should_search", "Classifying question");
    let prompt = SHOULD_SEARCH.render(&json!({ "question": state.question }))?;
    let raw = brain.complete(&prompt).await?;
    let raw = raw.trim().to_string();

    let decision = SearchDecision::from_model_output(&raw);
    info!(node = "should_search", decision = %decision, raw = %raw, "Search decision");
    state.decision = Some(decision);
    state.raw_decision = Some(raw);
    Ok(())
}

/// Join passage texts into the prompt context.
pub fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}

/// Fetch the top `k` passages for the question and build `context`.
pub async fn retrieve(state: &mut TurnState, store: &dyn VectorStore, k: usize) -> Result<()> {
    debug!(node = "retrieve", collection = store.collection_name(), k, "Searching");
    let passages = store.search(&state.question, k).await?;
    state.context = format_context(&passages);
    info!(
        node = "retrieve",
        passages = passages.len(),
        context_chars = state.context.chars().count(),
        "Retrieved context"
    );
    state.passages = passages;
    Ok(())
}

/// The answer template for a given context: ungrounded exactly when it is empty.
pub fn answer_template(context: &str) -> &'static PromptTemplate {
    if context.is_empty() {
        &UNGROUNDED_ANSWER
    } else {
        &GROUNDED_ANSWER
    }
}

/// Generate the turn's answer and record it as the turn's assistant message.
pub async fn generate_answer(state: &mut TurnState, brain: &Brain) -> Result<()> {
    let template = answer_template(&state.context);
    debug!(node = "generate_answer", template = template.name, "Generating answer");
    let prompt = template.render(&json!({
        "question": state.question,
        "context": state.context,
    }))?;
    let answer = brain.complete(&prompt).await?;
    info!(
        node = "generate_answer",
        template = template.name,
        chars = answer.chars().count(),
        "Answer generated"
    );
    state.set_answer(answer);
    Ok(())
}

/// Judge the turn's answer against the question and context.
pub async fn evaluate_answer(state: &mut TurnState, brain: &Brain) -> Result<()> {
    debug!(node = "evaluate_answer", "Evaluating answer");
    let last_answer = state
        .answer()
        .or_else(|| state.messages.last().map(|m| m.content.as_str()))
        .unwrap_or_default()
        .to_string();
    let prompt = EVALUATE_ANSWER.render(&json!({
        "question": state.question,
        "context": state.context,
        "last_answer": last_answer,
    }))?;
    let raw = brain.complete(&prompt).await?;
    let raw = raw.trim().to_string();

    state.evaluation = AnswerVerdict::parse(&raw);
    match state.evaluation {
        Some(verdict) => info!(node = "evaluate_answer", verdict = %verdict, "Answer evaluated"),
        None => warn!(node = "evaluate_answer", raw = %raw, "Unrecognised evaluation verdict"),
    }
    state.raw_evaluation = Some(raw);
    Ok(())
}

/// Terminal node. Leaves the state untouched.
pub fn final_output(_state: &mut TurnState) {
    debug!(node = "final_output", "Turn complete");
}
