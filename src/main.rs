//! Core Chat CLI - interactive assistant session over the Core bridge.
//!
//! This is the main binary entry point: a line-oriented front end for the
//! session engine in the `core_chat` library. Reads user input from
//! stdin, renders committed turns, and exposes a few slash commands.

use anyhow::Result;
use clap::Parser;
use core_chat::{Config, Session};
use mimalloc::MiMalloc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Interactive assistant session over the Core bridge.
#[derive(Parser, Debug)]
#[command(name = "core-chat", version, about)]
struct Cli {
    /// Bridge endpoint (overrides config; ws://, wss://, or http(s):// form)
    #[arg(long)]
    endpoint: Option<String>,

    /// Channel to subscribe to for assistant responses (overrides config)
    #[arg(long)]
    channel: Option<String>,
}

/// Print turns committed since the last render pass.
///
/// Returns the new rendered count.
fn render_new_turns(session: &Session, rendered: usize) -> usize {
    let turns = session.messages();
    for turn in &turns[rendered.min(turns.len())..] {
        let time = turn.timestamp.with_timezone(&chrono::Local).format("%H:%M");
        println!("[{time}] {}: {}", turn.role, turn.content);
    }
    turns.len()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let endpoint = cli
        .endpoint
        .map(|e| core_chat::ws::http_to_ws_scheme(&e))
        .unwrap_or(config.endpoint);
    let channel = cli.channel.unwrap_or(config.channel);

    let mut session = Session::new(channel);
    session.connect(&endpoint).await;

    println!("core-chat — {endpoint}");
    println!("Commands: /clear /disconnect /reconnect /status /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rendered = 0usize;

    loop {
        tokio::select! {
            event = session.next_event() => {
                if let Some(event) = event {
                    session.handle_event(event).await;
                }
                rendered = render_new_turns(&session, rendered);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break; // stdin closed
                };
                match line.trim() {
                    "" => {}
                    "/quit" | "/q" => break,
                    "/clear" => {
                        session.clear_messages();
                        rendered = 0;
                    }
                    "/disconnect" => session.disconnect().await,
                    "/reconnect" => session.connect(&endpoint).await,
                    "/status" => {
                        println!(
                            "connection: {} | phase: {}",
                            session.connection_state(),
                            session.phase()
                        );
                        if let Some(preview) = session.streaming_preview() {
                            println!("streaming: {preview}");
                        }
                    }
                    text => session.send_user_message(text).await,
                }
                rendered = render_new_turns(&session, rendered);
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
