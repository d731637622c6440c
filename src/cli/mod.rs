pub mod commands;

use std::io::{self, Write};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::error;

use crate::cli::commands::Commands;
use crate::config::AppConfig;
use crate::llm::models::ChatMessage;
use crate::session::{
    ChatSession, ConnectionRegistry, ImageRequest, RequestContext, SceneDescriptor, SendOutcome,
    SendRequest, SessionError, User,
};

const CLI_CONN_ID: u32 = 1;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Config Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;
    let registry = ConnectionRegistry::new();
    let owner = User {
        id: 0,
        name: std::env::var("USER").unwrap_or_else(|_| "local".to_string()),
    };

    match command {
        Commands::Chat {
            model,
            role,
            no_stream,
        } => {
            let session = ChatSession::open_with_config(
                &registry,
                CLI_CONN_ID,
                owner,
                SceneDescriptor::chat(&model, &role),
                &config,
            )?;
            let result = run_repl(&session, !no_stream).await;
            session.close();
            result
        }
        Commands::Paint {
            prompt,
            size,
            format,
            n,
        } => {
            let session = ChatSession::open_with_config(
                &registry,
                CLI_CONN_ID,
                owner,
                SceneDescriptor::painting(&size, &format, n),
                &config,
            )?;
            let ctx = RequestContext::new();
            let outcome = session
                .send_msg(&ctx, SendRequest::Painting(ImageRequest::new(prompt)))
                .await;
            session.close();

            match outcome? {
                SendOutcome::ImageUrl(url) => println!("{}", url),
                SendOutcome::ImageFile { path, .. } => {
                    println!("Image saved to: {}", path.display())
                }
                SendOutcome::Chat(_) => {}
            }
            Ok(())
        }
    }
}

async fn run_repl(session: &ChatSession, stream: bool) -> Result<(), CliError> {
    println!("--- Chatnet Terminal Chat ---");
    println!(
        "Connection: {} ({:?}), opened {}",
        session.conn_id(),
        session.scene(),
        session.opened_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Type /exit to quit.");
    println!("-----------------------------");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nYou> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let text = input.trim();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }

        let ctx = RequestContext::new();
        let messages = vec![ChatMessage::unassigned(text)];

        print!("AI> ");
        io::stdout().flush()?;

        if stream {
            let (tx, mut rx) = mpsc::channel::<String>(100);
            let printer = tokio::spawn(async move {
                while let Some(fragment) = rx.recv().await {
                    print!("{}", fragment);
                    let _ = io::stdout().flush();
                }
            });

            let result = session.send_msg_to_chat_stream(&ctx, messages, tx).await;
            let _ = printer.await;
            println!();
            if let Err(e) = result {
                error!("Stream failed: {}", e);
                eprintln!("Error: {}", e);
            }
        } else {
            match session.send_msg(&ctx, SendRequest::Chat(messages)).await {
                Ok(SendOutcome::Chat(completion)) => {
                    let reply = completion.reply().map(|m| m.content).unwrap_or_default();
                    println!("{}", reply);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Send failed: {}", e);
                    eprintln!("Error: {}", e);
                }
            }
        }
    }

    Ok(())
}
