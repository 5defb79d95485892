//! Prompt templates for the turn graph.
//!
//! Templates are Handlebars strings rendered in strict mode with HTML escaping
//! disabled, so a missing variable is an error and passage text reaches the
//! model verbatim.

use crate::error::GraphError;
use handlebars::Handlebars;
use serde::Serialize;

/// Phrase the grounded answer must emit when the context has nothing relevant.
pub const NO_INFORMATION_FALLBACK: &str =
    "提供されている社内ドキュメントの範囲では情報が見つかりませんでした。";

/// A prompt with an optional system instruction and a human turn.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub system: Option<&'static str>,
    pub human: &'static str,
}

/// A prompt after variable substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub name: &'static str,
    pub system: Option<String>,
    pub human: String,
}

impl PromptTemplate {
    /// Render both parts of the template against `vars`.
    pub fn render<T: Serialize>(&self, vars: &T) -> Result<RenderedPrompt, GraphError> {
        let mut engine = Handlebars::new();
        engine.set_strict_mode(true);
        engine.register_escape_fn(handlebars::no_escape);

        let render = |source: &str| {
            engine
                .render_template(source, vars)
                .map_err(|e| GraphError::Template {
                    name: self.name.to_string(),
                    message: e.to_string(),
                })
        };

        Ok(RenderedPrompt {
            name: self.name,
            system: self.system.map(render).transpose()?,
            human: render(self.human)?,
        })
    }
}

/// Classifies a question as needing private-document search or not.
pub const SHOULD_SEARCH: PromptTemplate = PromptTemplate {
    name: "should_search",
    system: None,
    human: "あなたは社内ドキュメント検索システムのルーターです。
以下のユーザの質問に対して、社内ドキュメントを検索する必要があるかどうかを判断してください。

質問: {{question}}

- 検索が必要な場合は \"SEARCH\"
- 挨拶や一般的な会話など、検索が不要な場合は \"NO_SEARCH\"
とだけ出力してください。",
};

/// Plain assistant answer without retrieved context.
pub const UNGROUNDED_ANSWER: PromptTemplate = PromptTemplate {
    name: "ungrounded_answer",
    system: Some(
        "あなたは親切なアシスタントです。ユーザの質問に、分かりやすく簡潔に答えてください。",
    ),
    human: "{{question}}",
};

/// Answer grounded in retrieved passages, with the verbatim fallback phrase.
pub const GROUNDED_ANSWER: PromptTemplate = PromptTemplate {
    name: "grounded_answer",
    system: Some(
        "あなたは社内ドキュメント検索アシスタントです。
以下のコンテキストを可能な限り参照しながら、ユーザの質問に答えてください。
コンテキストに関連情報がない場合は、
「提供されている社内ドキュメントの範囲では情報が見つかりませんでした。」と答えてください。

コンテキスト:
{{context}}",
    ),
    human: "{{question}}",
};

/// Judges whether an answer is adequate for the question and context.
pub const EVALUATE_ANSWER: PromptTemplate = PromptTemplate {
    name: "evaluate_answer",
    system: None,
    human: "あなたは回答の品質評価者です。
以下の回答が、質問およびコンテキストに基づいて適切かどうかを判定してください。

質問: {{question}}
コンテキスト: {{context}}
回答: {{last_answer}}

- 質問にきちんと答えており、コンテキストも適切に活用されている場合は \"GOOD\"
- 質問に答えていない / コンテキストを無視している / 明らかに不十分な場合は \"BAD\"
とだけ出力してください。",
};
