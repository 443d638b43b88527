//! Models command - list models available on the backend.

use ragline_backend::BackendClient;
use ragline_rag::RagConfig;

pub(crate) async fn run(config: &RagConfig) -> miette::Result<()> {
    let client = BackendClient::with_url(config.host.clone());
    let models = client
        .list_models()
        .await
        .map_err(|e| miette::miette!("Failed to list models: {}", e))?;

    if models.is_empty() {
        println!("No models available at {}", client.base_url());
        return Ok(());
    }

    println!("Models at {}:", client.base_url());
    for model in models {
        let marker = if model.id == config.model { "*" } else { " " };
        let state = if model.is_loaded() { "loaded" } else { "" };
        println!("  {} {:<48} {}", marker, model.id, state);
    }

    Ok(())
}
