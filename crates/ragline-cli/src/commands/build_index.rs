//! Build-index command - embed a JSONL corpus into a vector index.

use indicatif::{ProgressBar, ProgressStyle};
use ragline_rag::{corpus, create_embedder, RagConfig, VectorIndex};

pub(crate) async fn run(config: RagConfig) -> miette::Result<()> {
    let documents = corpus::load_jsonl(&config.corpus_path)
        .map_err(|e| miette::miette!("Failed to load corpus: {}", e))?;

    println!(
        "Loaded {} documents from {}",
        documents.len(),
        config.corpus_path.display()
    );

    let embedder = create_embedder(&config)
        .map_err(|e| miette::miette!("Failed to create embedder: {}", e))?;
    let index = VectorIndex::new(config.index_path.clone(), embedder);

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({eta})")
            .map_err(|e| miette::miette!("Invalid progress bar template: {}", e))?
            .progress_chars("#>-"),
    );

    let result = index
        .build_with_progress(&documents, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await;
    pb.finish_and_clear();

    let count = result.map_err(|e| miette::miette!("Failed to build index: {}", e))?;

    println!("Indexed {} documents", count);
    if count < documents.len() {
        println!("Skipped {} documents without usable text", documents.len() - count);
    }
    println!("Index written to: {}", config.index_path.display());

    Ok(())
}
