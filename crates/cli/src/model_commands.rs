use std::io::Write;

use {
    anyhow::Result,
    credlink_agents::{ChatMessage, OAuthProviders, StreamEvent},
    futures::StreamExt,
};

use crate::auth_commands::selected_kinds;

pub async fn list_models(providers: &OAuthProviders, provider: Option<&str>) -> Result<()> {
    for kind in selected_kinds(provider)? {
        if !providers.is_enabled(kind) {
            continue;
        }
        println!("{kind}:");
        for model in providers.available_models(kind).await {
            if model.display_name == model.id {
                println!("  {}", model.id);
            } else {
                println!("  {}  {}", model.id, model.display_name);
            }
        }
    }
    Ok(())
}

pub async fn chat(
    providers: &OAuthProviders,
    provider: &str,
    model: Option<&str>,
    prompt: &str,
    stream: bool,
) -> Result<()> {
    let handle = providers.get_model_instance(provider.parse()?, model)?;
    let messages = vec![ChatMessage::user(prompt)];

    if !stream {
        let response = handle.complete(&messages, &[]).await?;
        println!("{}", response.text.unwrap_or_default());
        return Ok(());
    }

    let mut events = handle.stream(messages);
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Delta(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            },
            StreamEvent::Done(usage) => {
                writeln!(stdout)?;
                tracing::debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "completion finished"
                );
                break;
            },
            StreamEvent::Error(message) => {
                writeln!(stdout)?;
                anyhow::bail!("{provider} stream failed: {message}");
            },
            StreamEvent::ToolCallStart { .. }
            | StreamEvent::ToolCallArgumentsDelta { .. }
            | StreamEvent::ToolCallComplete { .. } => {},
        }
    }
    Ok(())
}
