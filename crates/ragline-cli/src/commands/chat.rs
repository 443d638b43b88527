//! Chat command - multi-turn conversation over stdin.

use ragline_backend::TtlReaper;
use ragline_rag::{RagConfig, RagOrchestrator};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub(crate) async fn run(config: RagConfig) -> miette::Result<()> {
    let top_k = config.top_k;
    let reaper_interval = config.reaper_interval;
    let mut rag = RagOrchestrator::connect(config)
        .await
        .map_err(|e| miette::miette!("Failed to set up pipeline: {}", e))?;
    let reaper = TtlReaper::spawn(rag.registry(), reaper_interval);

    println!("Chatting with {} (/reset to forget, /quit to leave)", rag.model());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                reaper.shutdown().await;
                return Err(miette::miette!("Failed to read input: {}", e));
            }
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                rag.reset();
                println!("History cleared.");
            }
            question => {
                let response = rag
                    .ask_streaming(question, top_k, |fragment| {
                        print!("{}", fragment);
                        std::io::stdout().flush().ok();
                    })
                    .await;
                println!();
                if !response.success {
                    eprintln!("{}", response.answer);
                }
            }
        }
    }

    reaper.shutdown().await;
    Ok(())
}
