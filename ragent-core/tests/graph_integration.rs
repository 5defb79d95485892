//! Integration tests for the turn graph.
//!
//! These tests run whole turns through the executor with MockLlmProvider,
//! checking routing, context assembly, and error propagation end-to-end.

use pretty_assertions::assert_eq;
use ragent_core::brain::MockLlmProvider;
use ragent_core::embeddings::LocalEmbedder;
use ragent_core::error::{LlmError, RagentError, StoreError};
use ragent_core::graph::{
    AnswerVerdict, Graph, GraphExecutor, GraphVariant, Node, SearchDecision,
};
use ragent_core::prompts::NO_INFORMATION_FALLBACK;
use ragent_core::store::{Document, SqliteVectorStore, StaticVectorStore, VectorStore};
use ragent_core::types::{Message, Role};
use std::sync::Arc;

/// Helper to build an executor over a mock provider and a fixed store.
fn create_executor(
    variant: GraphVariant,
    responses: &[&str],
    store: Arc<dyn VectorStore>,
) -> (Arc<MockLlmProvider>, GraphExecutor) {
    let provider = Arc::new(MockLlmProvider::with_responses(responses.iter().copied()));
    let executor = GraphExecutor::new(Graph::new(variant), provider.clone(), store);
    (provider, executor)
}

fn document(id: &str, content: &str, source: &str) -> Document {
    let mut metadata = serde_json::Map::new();
    metadata.insert("source".into(), source.into());
    Document {
        id: id.to_string(),
        content: content.to_string(),
        metadata,
    }
}

#[tokio::test]
async fn test_greeting_skips_retrieval() {
    let store = Arc::new(StaticVectorStore::from_texts(["unused"]));
    let (provider, executor) = create_executor(
        GraphVariant::Simple,
        &["NO_SEARCH", "こんにちは！何かお手伝いできますか？"],
        store.clone(),
    );

    let outcome = executor
        .invoke(vec![Message::user("こんにちは")])
        .await
        .unwrap();

    assert_eq!(outcome.state.decision, Some(SearchDecision::NoSearch));
    assert_eq!(outcome.state.context, "");
    assert!(store.queries().is_empty());
    assert_eq!(outcome.reply(), "こんにちは！何かお手伝いできますか？");

    let messages = outcome.into_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);

    // The answer prompt carries no retrieved context.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let system = requests[1].system_text();
    assert!(!system.contains("コンテキスト"));
    assert_eq!(requests[1].last_user_text(), Some("こんにちは"));
}

#[tokio::test]
async fn test_document_question_uses_top_three_passages() {
    let store = Arc::new(StaticVectorStore::from_texts([
        "休暇申請は人事ポータルから行います。",
        "申請は取得予定日の3営業日前までに提出します。",
        "上長の承認後に確定します。",
        "経費精算は月末締めです。",
    ]));
    let (provider, executor) = create_executor(
        GraphVariant::Simple,
        &["SEARCH", "人事ポータルから申請してください。"],
        store.clone(),
    );

    let outcome = executor
        .invoke(vec![Message::user("社内の休暇申請の手順は？")])
        .await
        .unwrap();

    assert_eq!(
        outcome.path,
        vec![
            Node::ReceiveQuestion,
            Node::ShouldSearch,
            Node::Retrieve,
            Node::GenerateAnswer
        ]
    );
    assert_eq!(store.queries(), vec!["社内の休暇申請の手順は？".to_string()]);
    assert_eq!(outcome.state.passages.len(), 3);
    assert_eq!(
        outcome.state.context,
        "休暇申請は人事ポータルから行います。\n\n申請は取得予定日の3営業日前までに提出します。\n\n上長の承認後に確定します。"
    );

    let system = provider.requests()[1].system_text();
    assert!(system.contains(&outcome.state.context));
    assert!(system.contains(NO_INFORMATION_FALLBACK));
    assert!(!system.contains("経費精算"));
}

#[tokio::test]
async fn test_search_with_no_passages_answers_ungrounded() {
    let store = Arc::new(StaticVectorStore::new(Vec::new()));
    let (provider, executor) = create_executor(
        GraphVariant::Simple,
        &["SEARCH", "一般的には上長に相談します。"],
        store.clone(),
    );

    let outcome = executor
        .invoke(vec![Message::user("社内の休暇申請の手順は？")])
        .await
        .unwrap();

    assert_eq!(store.queries().len(), 1);
    assert_eq!(outcome.state.context, "");
    let system = provider.requests()[1].system_text();
    assert!(!system.contains(NO_INFORMATION_FALLBACK));
    assert_eq!(outcome.reply(), "一般的には上長に相談します。");
}

#[tokio::test]
async fn test_transcript_grows_by_two_per_turn() {
    let store = Arc::new(StaticVectorStore::new(Vec::new()));
    let (provider, executor) = create_executor(
        GraphVariant::Evaluated,
        &["NO_SEARCH", "first", "GOOD", "NO_SEARCH", "second", "GOOD"],
        store,
    );

    let history = executor
        .invoke(vec![Message::user("one")])
        .await
        .unwrap()
        .into_messages();
    let mut seed = history.clone();
    seed.push(Message::user("two"));
    let outcome = executor.invoke(seed).await.unwrap();

    assert_eq!(outcome.state.question, "two");
    assert_eq!(outcome.state.messages.len(), 4);
    assert_eq!(outcome.state.messages[0].id, history[0].id);
    assert_eq!(outcome.state.messages[1].id, history[1].id);
    assert_eq!(outcome.reply(), "second");
    assert_eq!(provider.call_count(), 6);
}

#[tokio::test]
async fn test_evaluated_variant_records_verdict() {
    let store = Arc::new(StaticVectorStore::from_texts(["passage"]));
    let (provider, executor) = create_executor(
        GraphVariant::Evaluated,
        &["SEARCH", "grounded answer", "  BAD \n"],
        store,
    );

    let outcome = executor.invoke(vec![Message::user("q")]).await.unwrap();

    assert_eq!(outcome.path.last(), Some(&Node::FinalOutput));
    assert_eq!(outcome.state.evaluation, Some(AnswerVerdict::Bad));
    assert_eq!(outcome.state.raw_evaluation.as_deref(), Some("BAD"));
    assert_eq!(outcome.reply(), "grounded answer");

    let judge = provider.requests()[2].last_user_text().unwrap_or_default().to_string();
    assert!(judge.contains("grounded answer"));
    assert!(judge.contains("passage"));
}

#[tokio::test]
async fn test_unrecognised_decision_skips_retrieval() {
    let store = Arc::new(StaticVectorStore::from_texts(["p"]));
    let (_, executor) = create_executor(
        GraphVariant::Simple,
        &["I think maybe", "answer"],
        store.clone(),
    );

    let outcome = executor.invoke(vec![Message::user("q")]).await.unwrap();
    assert_eq!(outcome.state.decision, Some(SearchDecision::NoSearch));
    assert_eq!(outcome.state.raw_decision.as_deref(), Some("I think maybe"));
    assert!(store.queries().is_empty());
}

#[tokio::test]
async fn test_provider_error_aborts_turn() {
    let store = Arc::new(StaticVectorStore::new(Vec::new()));
    let provider = Arc::new(MockLlmProvider::with_responses(["NO_SEARCH"]));
    provider.queue_error(LlmError::Timeout { timeout_secs: 120 });
    let executor = GraphExecutor::new(Graph::default(), provider.clone(), store);

    let err = executor
        .invoke(vec![Message::user("q")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RagentError::Llm(LlmError::Timeout { timeout_secs: 120 })
    ));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_missing_collection_aborts_turn() {
    let store = Arc::new(StaticVectorStore::missing());
    let (provider, executor) = create_executor(GraphVariant::Simple, &["SEARCH"], store);

    let err = executor
        .invoke(vec![Message::user("q")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RagentError::Store(StoreError::CollectionMissing { .. })
    ));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(LocalEmbedder::new(256));
    let store = Arc::new(
        SqliteVectorStore::open(&dir.path().join("vectors.db"), "internal_docs", embedder)
            .unwrap(),
    );
    store
        .add_documents(&[
            document(
                "leave",
                "休暇申請は人事ポータルの休暇申請フォームから提出します。",
                "docs/leave.md",
            ),
            document("expense", "経費精算の締め切りは毎月25日です。", "docs/expense.md"),
            document("wifi", "Guest wifi password rotates weekly.", "docs/wifi.md"),
        ])
        .await
        .unwrap();

    let (provider, executor) = create_executor(
        GraphVariant::Evaluated,
        &["SEARCH", "人事ポータルから提出します。", "GOOD"],
        store,
    );
    let executor = executor.with_top_k(1);

    let outcome = executor
        .invoke(vec![Message::user("休暇申請の手順は？")])
        .await
        .unwrap();

    assert_eq!(outcome.state.passages.len(), 1);
    assert_eq!(outcome.state.passages[0].id, "leave");
    assert_eq!(outcome.state.passages[0].source(), Some("docs/leave.md"));
    assert!(outcome.state.context.contains("休暇申請フォーム"));
    assert_eq!(outcome.state.evaluation, Some(AnswerVerdict::Good));
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_sqlite_store_missing_collection() {
    let embedder = Arc::new(LocalEmbedder::new(64));
    let store = Arc::new(SqliteVectorStore::open_in_memory("empty", embedder).unwrap());
    let (_, executor) = create_executor(GraphVariant::Simple, &["SEARCH"], store);

    let err = executor
        .invoke(vec![Message::user("anything")])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Collection not found: empty"));
}
