//! Runs one turn through the graph.

use super::router::{Route, route_after_decision, route_after_evaluation};
use super::state::TurnState;
use super::{Endpoint, Graph, GraphVariant, Node, steps};
use crate::brain::{Brain, LlmProvider};
use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::store::VectorStore;
use crate::types::Message;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of passages fetched by `retrieve`.
pub const DEFAULT_TOP_K: usize = 3;

/// Default cap on node executions per turn.
pub const DEFAULT_MAX_STEPS: usize = 16;

/// Result of one graph invocation.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final turn state, including the extended transcript.
    pub state: TurnState,
    /// Nodes executed, in order.
    pub path: Vec<Node>,
}

impl TurnOutcome {
    /// The assistant reply produced this turn.
    pub fn reply(&self) -> &str {
        self.state
            .answer()
            .or_else(|| self.state.messages.last().map(|m| m.content.as_str()))
            .unwrap_or_default()
    }

    /// The transcript to carry into the next turn.
    pub fn into_messages(self) -> Vec<Message> {
        self.state.messages
    }
}

/// Composes the step functions and router into a single invocable unit.
///
/// Holds no per-turn state; `invoke` may be called repeatedly.
pub struct GraphExecutor {
    graph: Graph,
    brain: Brain,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    max_regenerations: usize,
    max_steps: usize,
}

impl GraphExecutor {
    pub fn new(graph: Graph, provider: Arc<dyn LlmProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            graph,
            brain: Brain::new(provider, 0.0),
            store,
            top_k: DEFAULT_TOP_K,
            max_regenerations: 0,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Build an executor from the graph section of the configuration.
    pub fn from_config(
        config: &GraphConfig,
        top_k: usize,
        temperature: f32,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            graph: Graph::from_config(config),
            brain: Brain::new(provider, temperature),
            store,
            top_k,
            max_regenerations: config.max_regenerations,
            max_steps: config.max_steps,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_regenerations(mut self, budget: usize) -> Self {
        self.max_regenerations = budget;
        self.graph = self.graph.with_regeneration(budget > 0);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    /// Run one turn over `messages` (transcript plus the new human message).
    ///
    /// The first capability error aborts the turn and is returned unchanged.
    pub async fn invoke(&self, messages: Vec<Message>) -> Result<TurnOutcome> {
        let budget = if self.graph.regenerates() {
            self.max_regenerations
        } else {
            0
        };
        let mut state = TurnState::new(messages).with_regenerations(budget);
        let mut path = Vec::new();
        let mut current = Endpoint::Node(self.graph.entry());

        while let Endpoint::Node(node) = current {
            if path.len() >= self.max_steps {
                return Err(GraphError::StepLimitExceeded {
                    limit: self.max_steps,
                }
                .into());
            }
            path.push(node);
            self.run_node(node, &mut state).await?;
            let next = self.next(node, &mut state);
            debug!(from = %node, to = ?next, "Transition");
            current = next;
        }

        info!(
            path = %path.iter().map(|n| n.name()).collect::<Vec<_>>().join(" -> "),
            decision = ?state.decision,
            evaluation = ?state.evaluation,
            "Turn finished"
        );
        Ok(TurnOutcome { state, path })
    }

    async fn run_node(&self, node: Node, state: &mut TurnState) -> Result<()> {
        match node {
            Node::ReceiveQuestion => steps::receive_question(state),
            Node::ShouldSearch => steps::should_search(state, &self.brain).await?,
            Node::Retrieve => steps::retrieve(state, self.store.as_ref(), self.top_k).await?,
            Node::GenerateAnswer => steps::generate_answer(state, &self.brain).await?,
            Node::EvaluateAnswer => steps::evaluate_answer(state, &self.brain).await?,
            Node::FinalOutput => steps::final_output(state),
        }
        Ok(())
    }

    /// Successor of `node`, consulting the router at the two decision points.
    fn next(&self, node: Node, state: &mut TurnState) -> Endpoint {
        match node {
            Node::ReceiveQuestion => Endpoint::Node(Node::ShouldSearch),
            Node::ShouldSearch => match route_after_decision(state) {
                Route::Retrieve => Endpoint::Node(Node::Retrieve),
                _ => Endpoint::Node(Node::GenerateAnswer),
            },
            Node::Retrieve => Endpoint::Node(Node::GenerateAnswer),
            Node::GenerateAnswer => match self.graph.variant() {
                GraphVariant::Simple => Endpoint::End,
                GraphVariant::Evaluated => Endpoint::Node(Node::EvaluateAnswer),
            },
            Node::EvaluateAnswer => match route_after_evaluation(state) {
                Route::Regenerate => {
                    state.regenerations_remaining -= 1;
                    state.evaluation = None;
                    info!(
                        remaining = state.regenerations_remaining,
                        "Answer judged BAD, regenerating"
                    );
                    Endpoint::Node(Node::GenerateAnswer)
                }
                _ => Endpoint::Node(Node::FinalOutput),
            },
            Node::FinalOutput => Endpoint::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::RagentError;
    use crate::graph::state::{AnswerVerdict, SearchDecision};
    use crate::store::StaticVectorStore;

    fn executor(
        variant: GraphVariant,
        responses: &[&str],
        store: StaticVectorStore,
    ) -> (Arc<MockLlmProvider>, GraphExecutor) {
        let provider = Arc::new(MockLlmProvider::with_responses(responses.iter().copied()));
        let exec = GraphExecutor::new(Graph::new(variant), provider.clone(), Arc::new(store));
        (provider, exec)
    }

    #[tokio::test]
    async fn test_simple_variant_ends_after_answer() {
        let (provider, exec) = executor(
            GraphVariant::Simple,
            &["NO_SEARCH", "hello"],
            StaticVectorStore::new(Vec::new()),
        );
        let outcome = exec.invoke(vec![Message::user("hi")]).await.unwrap();
        assert_eq!(
            outcome.path,
            vec![Node::ReceiveQuestion, Node::ShouldSearch, Node::GenerateAnswer]
        );
        assert_eq!(outcome.reply(), "hello");
        assert_eq!(provider.call_count(), 2);
        assert!(outcome.state.evaluation.is_none());
    }

    #[tokio::test]
    async fn test_path_follows_graph_edges() {
        let (_, exec) = executor(
            GraphVariant::Evaluated,
            &["SEARCH", "answer", "GOOD"],
            StaticVectorStore::from_texts(["p"]),
        );
        let outcome = exec.invoke(vec![Message::user("q")]).await.unwrap();
        let graph = exec.graph();
        assert!(graph.has_edge(Endpoint::Start, Endpoint::Node(outcome.path[0])));
        for pair in outcome.path.windows(2) {
            assert!(graph.has_edge(Endpoint::Node(pair[0]), Endpoint::Node(pair[1])));
        }
        assert_eq!(outcome.path.last(), Some(&Node::FinalOutput));
        assert_eq!(outcome.state.decision, Some(SearchDecision::Search));
        assert_eq!(outcome.state.evaluation, Some(AnswerVerdict::Good));
    }

    #[tokio::test]
    async fn test_bad_verdict_is_advisory_by_default() {
        let (provider, exec) = executor(
            GraphVariant::Evaluated,
            &["NO_SEARCH", "weak answer", "BAD"],
            StaticVectorStore::new(Vec::new()),
        );
        let outcome = exec.invoke(vec![Message::user("q")]).await.unwrap();
        assert_eq!(outcome.reply(), "weak answer");
        assert_eq!(outcome.state.evaluation, Some(AnswerVerdict::Bad));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_regeneration_replaces_answer() {
        let (provider, exec) = executor(
            GraphVariant::Evaluated,
            &["NO_SEARCH", "weak answer", "BAD", "better answer", "GOOD"],
            StaticVectorStore::new(Vec::new()),
        );
        let exec = exec.with_max_regenerations(1);
        let outcome = exec.invoke(vec![Message::user("q")]).await.unwrap();
        assert_eq!(outcome.reply(), "better answer");
        assert_eq!(outcome.state.assistant_count(), 1);
        assert_eq!(outcome.state.messages.len(), 2);
        assert_eq!(provider.call_count(), 5);
        assert_eq!(
            outcome.path.iter().filter(|n| **n == Node::GenerateAnswer).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_regeneration_budget_is_bounded() {
        let (provider, exec) = executor(
            GraphVariant::Evaluated,
            &["NO_SEARCH", "a1", "BAD", "a2", "BAD", "a3", "BAD"],
            StaticVectorStore::new(Vec::new()),
        );
        let exec = exec.with_max_regenerations(2);
        let outcome = exec.invoke(vec![Message::user("q")]).await.unwrap();
        assert_eq!(outcome.reply(), "a3");
        assert_eq!(outcome.state.evaluation, Some(AnswerVerdict::Bad));
        assert_eq!(outcome.state.regenerations_remaining, 0);
        assert_eq!(provider.call_count(), 7);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let (_, exec) = executor(
            GraphVariant::Evaluated,
            &["NO_SEARCH", "a"],
            StaticVectorStore::new(Vec::new()),
        );
        let exec = exec.with_max_steps(2);
        let err = exec.invoke(vec![Message::user("q")]).await.unwrap_err();
        assert!(matches!(
            err,
            RagentError::Graph(GraphError::StepLimitExceeded { limit: 2 })
        ));
    }

    #[tokio::test]
    async fn test_from_config_no_eval() {
        let provider = Arc::new(MockLlmProvider::with_responses(["NO_SEARCH", "x"]));
        let config = GraphConfig {
            evaluate: false,
            ..Default::default()
        };
        let exec = GraphExecutor::from_config(
            &config,
            3,
            0.0,
            provider,
            Arc::new(StaticVectorStore::new(Vec::new())),
        );
        assert_eq!(exec.graph().variant(), GraphVariant::Simple);
        let outcome = exec.invoke(vec![Message::user("q")]).await.unwrap();
        assert_eq!(outcome.path.len(), 3);
    }
}
