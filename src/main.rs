use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;

use antigravity_lib::models::Message;
use antigravity_lib::{
    config, create_client, init_logging, ChatRequest, EnvTokenProvider, StreamEvent,
};

#[tokio::main]
async fn main() {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(prompt) = args.next() else {
        eprintln!("usage: antigravity-chat \"<prompt>\" [model]");
        std::process::exit(2);
    };

    if let Err(e) = run(prompt, args.next()).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(prompt: String, model: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::init_config()?;
    let model = model.unwrap_or_else(|| config.default_model.clone());
    let client = create_client(&config, Arc::new(EnvTokenProvider::new()))?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("[Chat] interrupted");
            let _ = cancel_tx.send(true);
        }
    });

    let mut request = ChatRequest::new(&model, vec![Message::user(&prompt)]);
    request.cancel = Some(cancel_rx);

    let mut events = client.chat_stream(request).await?;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Content { delta } => {
                print!("{}", delta);
                stdout.flush()?;
            }
            StreamEvent::ToolCall { name, input, .. } => {
                println!("\n[tool call] {} {}", name, input);
            }
            StreamEvent::Usage {
                prompt_tokens,
                completion_tokens,
            } => {
                log::info!(
                    "[Chat] usage: {} prompt, {} completion tokens",
                    prompt_tokens,
                    completion_tokens
                );
            }
            StreamEvent::Done { finish_reason } => {
                println!();
                log::info!("[Chat] finished: {}", finish_reason);
                break;
            }
            StreamEvent::Error { message } => {
                println!();
                return Err(message.into());
            }
        }
    }

    Ok(())
}
