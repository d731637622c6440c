use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatnet", version, about = "Chat and image sessions against an OpenAI-compatible API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enter interactive chat REPL mode
    Chat {
        /// Model to talk to (defaults to chat.default_model)
        #[arg(short, long, default_value = "")]
        model: String,

        /// Who the assistant is talking to: ai, human or agent
        #[arg(short, long, default_value = "")]
        role: String,

        /// Wait for whole replies instead of streaming fragments
        #[arg(long)]
        no_stream: bool,
    },

    /// Generate an image from a prompt
    Paint {
        #[arg(short, long)]
        prompt: String,

        #[arg(short, long, default_value = "512x512")]
        size: String,

        /// url prints a link; base64 saves to painting.output_path
        #[arg(short, long, default_value = "url")]
        format: String,

        #[arg(short, default_value_t = 1)]
        n: u32,
    },
}
