//! Client execution logic: a terminal front-end around one login cycle.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use super::session::{ChatClient, ClientError};

const QUIT_COMMAND: &str = "/quit";

/// Run one login cycle: log in, forward typed lines, and on `/quit` (or end
/// of input) request logout and wait for the cycle to wind down.
pub async fn run_client(host: String, port: u16, user: String) -> Result<(), ClientError> {
    if user.trim().is_empty() {
        return Err(ClientError::BlankUser);
    }

    let (transcript_tx, mut transcript_rx) = mpsc::unbounded_channel::<String>();

    // Print transcript lines as they arrive.
    let printer = tokio::spawn(async move {
        while let Some(line) = transcript_rx.recv().await {
            println!("{line}");
        }
    });

    let client = match ChatClient::login(&host, port, user.as_str(), transcript_tx).await {
        Ok(client) => client,
        Err(e) => {
            // The failure line is already on the transcript; let it print.
            printer.await.ok();
            return Err(e);
        }
    };
    println!("You are '{user}'. Type messages and press Enter to send. {QUIT_COMMAND} logs out.");

    // rustyline is synchronous; give it its own thread and bridge the lines
    // over a channel.
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt_user = user.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {e}");
                return;
            }
        };

        let prompt = format!("{prompt_user}> ");

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    if input_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::error!("Readline error: {}", e);
                    break;
                }
            }
        }
    });

    while let Some(line) = input_rx.recv().await {
        if line == QUIT_COMMAND {
            break;
        }
        if client.send(line).await.is_err() {
            // Cycle already over (server gone); stop reading input.
            break;
        }
    }

    client.logout().await;
    client.closed().await;

    // The receive activity held the last transcript sender, so the printer
    // drains and stops on its own once the cycle is fully closed.
    printer.await.ok();

    Ok(())
}
