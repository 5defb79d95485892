//! Interactive chat and single-question modes.

use ragent_core::capabilities::Capabilities;
use ragent_core::config::RagentConfig;
use ragent_core::conversation::ConversationLoop;
use ragent_core::types::Message;
use tokio::io::BufReader;

/// Banner title for the selected provider.
pub(crate) fn banner_title(capabilities: &Capabilities) -> String {
    let provider = match capabilities.provider {
        ragent_core::ProviderKind::OpenAi => "OpenAI",
        ragent_core::ProviderKind::Gemini => "Gemini",
    };
    format!("Ragent x {provider} RAG Agent")
}

/// Run the conversation loop on stdin/stdout until exit, end of input, or Ctrl+C.
pub async fn run_interactive(config: RagentConfig) -> anyhow::Result<()> {
    let capabilities = Capabilities::from_config(&config)?;
    let executor = capabilities.executor(&config);
    let mut chat = ConversationLoop::new(executor).with_title(banner_title(&capabilities));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        result = chat.run(stdin, &mut stdout) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\nExiting.");
        }
    }

    let usage = chat.usage();
    tracing::info!(
        messages = chat.history().len(),
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "Conversation ended"
    );
    Ok(())
}

/// Answer one question and print the reply.
pub async fn run_single_task(question: &str, config: RagentConfig) -> anyhow::Result<()> {
    let capabilities = Capabilities::from_config(&config)?;
    let executor = capabilities.executor(&config);

    let outcome = executor.invoke(vec![Message::user(question)]).await?;
    println!("{}", outcome.reply());
    tracing::info!(tokens = executor.brain().total_usage().total(), "Question answered");
    Ok(())
}
