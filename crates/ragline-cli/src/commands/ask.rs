//! Ask command - answer a single question.

use ragline_rag::{AskResponse, RagConfig, RagOrchestrator};
use std::io::Write;

pub(crate) async fn run(config: RagConfig, question: &str, stream: bool) -> miette::Result<()> {
    let top_k = config.top_k;
    let mut rag = RagOrchestrator::connect(config)
        .await
        .map_err(|e| miette::miette!("Failed to set up pipeline: {}", e))?;

    let response = if stream {
        let response = rag
            .ask_streaming(question, top_k, |fragment| {
                print!("{}", fragment);
                std::io::stdout().flush().ok();
            })
            .await;
        println!();
        response
    } else {
        let response = rag.ask(question, top_k).await;
        if response.success {
            println!("{}", response.answer);
        }
        response
    };

    report(&response)
}

/// Print sources, or turn a failed answer into an error.
pub(crate) fn report(response: &AskResponse) -> miette::Result<()> {
    if !response.success {
        return Err(miette::miette!("{}", response.answer));
    }

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &response.sources {
            let title = source
                .metadata
                .get("title")
                .map(String::as_str)
                .unwrap_or("untitled");
            println!("  [{:.3}] {}", source.score, title);
        }
    }

    Ok(())
}
