//! The turn graph: named nodes, the edges between them, and their execution.
//!
//! ```text
//! receive_question -> should_search -+-> retrieve -> generate_answer
//!                                    +------------> generate_answer
//! generate_answer -> [evaluate_answer -> final_output]   (evaluated variant)
//! ```

pub mod executor;
pub mod router;
pub mod state;
pub mod steps;

pub use executor::{GraphExecutor, TurnOutcome};
pub use router::{Route, route_after_decision, route_after_evaluation};
pub use state::{AnswerVerdict, SearchDecision, TurnState};

use crate::config::GraphConfig;
use std::fmt::Write as _;

/// A step in the turn graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    ReceiveQuestion,
    ShouldSearch,
    Retrieve,
    GenerateAnswer,
    EvaluateAnswer,
    FinalOutput,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::ReceiveQuestion => "receive_question",
            Node::ShouldSearch => "should_search",
            Node::Retrieve => "retrieve",
            Node::GenerateAnswer => "generate_answer",
            Node::EvaluateAnswer => "evaluate_answer",
            Node::FinalOutput => "final_output",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which tail the graph has after answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphVariant {
    /// Terminates right after `generate_answer`.
    Simple,
    /// Runs `evaluate_answer` and `final_output` after answering.
    #[default]
    Evaluated,
}

/// One end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Start,
    Node(Node),
    End,
}

impl Endpoint {
    fn mermaid_id(&self) -> &'static str {
        match self {
            Endpoint::Start => "__start__",
            Endpoint::Node(node) => node.name(),
            Endpoint::End => "__end__",
        }
    }
}

/// A directed edge; conditional edges carry the router's label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: Endpoint,
    pub to: Endpoint,
    pub condition: Option<Route>,
}

impl Edge {
    fn fixed(from: Endpoint, to: Endpoint) -> Self {
        Self {
            from,
            to,
            condition: None,
        }
    }

    fn when(from: Node, route: Route, to: Node) -> Self {
        Self {
            from: Endpoint::Node(from),
            to: Endpoint::Node(to),
            condition: Some(route),
        }
    }
}

/// Static shape of the turn graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Graph {
    variant: GraphVariant,
    regenerate_on_bad: bool,
}

impl Graph {
    pub fn new(variant: GraphVariant) -> Self {
        Self {
            variant,
            regenerate_on_bad: false,
        }
    }

    /// The shape selected by the graph section of the configuration.
    pub fn from_config(config: &GraphConfig) -> Self {
        let variant = if config.evaluate {
            GraphVariant::Evaluated
        } else {
            GraphVariant::Simple
        };
        Self::new(variant).with_regeneration(config.max_regenerations > 0)
    }

    /// Add the `evaluate_answer -> generate_answer` edge taken on a `BAD` verdict.
    /// Has no effect on the simple variant.
    pub fn with_regeneration(mut self, enabled: bool) -> Self {
        self.regenerate_on_bad = enabled && self.variant == GraphVariant::Evaluated;
        self
    }

    pub fn variant(&self) -> GraphVariant {
        self.variant
    }

    pub fn regenerates(&self) -> bool {
        self.regenerate_on_bad
    }

    pub fn entry(&self) -> Node {
        Node::ReceiveQuestion
    }

    /// Nodes present in this variant, in declaration order.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes = vec![
            Node::ReceiveQuestion,
            Node::ShouldSearch,
            Node::Retrieve,
            Node::GenerateAnswer,
        ];
        if self.variant == GraphVariant::Evaluated {
            nodes.extend([Node::EvaluateAnswer, Node::FinalOutput]);
        }
        nodes
    }

    /// Every edge in this variant.
    pub fn edges(&self) -> Vec<Edge> {
        use Endpoint::{End, Start};
        let mut edges = vec![
            Edge::fixed(Start, Endpoint::Node(Node::ReceiveQuestion)),
            Edge::fixed(
                Endpoint::Node(Node::ReceiveQuestion),
                Endpoint::Node(Node::ShouldSearch),
            ),
            Edge::when(Node::ShouldSearch, Route::Retrieve, Node::Retrieve),
            Edge::when(Node::ShouldSearch, Route::GenerateAnswer, Node::GenerateAnswer),
            Edge::fixed(
                Endpoint::Node(Node::Retrieve),
                Endpoint::Node(Node::GenerateAnswer),
            ),
        ];
        match self.variant {
            GraphVariant::Simple => {
                edges.push(Edge::fixed(Endpoint::Node(Node::GenerateAnswer), End));
            }
            GraphVariant::Evaluated => {
                edges.push(Edge::fixed(
                    Endpoint::Node(Node::GenerateAnswer),
                    Endpoint::Node(Node::EvaluateAnswer),
                ));
                edges.push(Edge::when(
                    Node::EvaluateAnswer,
                    Route::FinalOutput,
                    Node::FinalOutput,
                ));
                if self.regenerate_on_bad {
                    edges.push(Edge::when(
                        Node::EvaluateAnswer,
                        Route::Regenerate,
                        Node::GenerateAnswer,
                    ));
                }
                edges.push(Edge::fixed(Endpoint::Node(Node::FinalOutput), End));
            }
        }
        edges
    }

    /// Whether `from -> to` is an edge of this graph.
    pub fn has_edge(&self, from: Endpoint, to: Endpoint) -> bool {
        self.edges().iter().any(|e| e.from == from && e.to == to)
    }

    /// Render the graph as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");
        let _ = writeln!(out, "\t__start__([<p>__start__</p>]):::first");
        for node in self.nodes() {
            let _ = writeln!(out, "\t{0}({0})", node.name());
        }
        let _ = writeln!(out, "\t__end__([<p>__end__</p>]):::last");
        for edge in self.edges() {
            let from = edge.from.mermaid_id();
            let to = edge.to.mermaid_id();
            let _ = match edge.condition {
                Some(route) => writeln!(out, "\t{} -. &nbsp;{}&nbsp; .-> {};", from, route.label(), to),
                None => writeln!(out, "\t{} --> {};", from, to),
            };
        }
        out.push_str("\tclassDef default fill:#f2f0ff,line-height:1.2\n");
        out.push_str("\tclassDef first fill-opacity:0\n");
        out.push_str("\tclassDef last fill:#bfb6fc\n");
        out
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(GraphVariant::default())
    }
}
