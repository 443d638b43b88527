//! Info command - show configuration and index status.

use ragline_rag::{create_embedder, paths, RagConfig, VectorIndex};

pub(crate) fn run(config: &RagConfig) -> miette::Result<()> {
    println!("Ragline");
    println!("=======");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Backend:          {}", config.host);
    println!("Chat model:       {}", config.model);
    println!(
        "Embedder:         {} ({} dimensions)",
        config.embedding_backend, config.embedding_dimension
    );
    if config.embedding_backend == "remote" {
        println!("Embedding model:  {}", config.embedding_model);
    }
    println!("Model TTL:        {} minutes", config.model_ttl_minutes);
    println!();

    println!("Data directory:   {}", paths::data_dir().display());
    println!("Corpus:           {}", config.corpus_path.display());
    println!("  Exists: {}", config.corpus_path.exists());
    println!("Index:            {}", config.index_path.display());

    let embedder = create_embedder(config)
        .map_err(|e| miette::miette!("Failed to create embedder: {}", e))?;
    let index = VectorIndex::new(config.index_path.clone(), embedder);
    match index.load() {
        Ok(true) => println!(
            "  Documents: {} ({} dimensions)",
            index.len(),
            index.dimension().unwrap_or_default()
        ),
        Ok(false) => println!("  Not built yet. Run: ragline build-index"),
        Err(e) => println!("  Unusable: {}", e),
    }

    Ok(())
}
