mod config;
mod error;
mod server;
mod store;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hs_reasoning::conversation::ClassificationEngine;
use hs_reasoning::rules::RuleStore;
use hs_reasoning::taxonomy::{NoTaxonomy, StaticTaxonomy, TaxonomyLookup};

use config::Config;
use error::AppError;
use server::HsClassifierServer;
use store::ConversationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting hs-classifier MCP server");

    let config = Config::from_env()?;
    info!(
        max_rounds = config.engine.max_rounds,
        max_questions = config.engine.max_questions_per_round,
        "engine configured"
    );

    let rules = match &config.rules_path {
        Some(path) => {
            info!(path = %path.display(), "using rule document from file");
            RuleStore::from_path(path)
        }
        None => RuleStore::embedded(),
    };
    let rules = Arc::new(rules);
    let table = rules.ensure_loaded();
    if table.is_degraded() {
        tracing::warn!("rule table degraded, elimination disabled");
    }

    let taxonomy = load_taxonomy(&config)?;
    let engine = ClassificationEngine::new(rules, taxonomy, config.engine.clone());
    let server = HsClassifierServer::new(Arc::new(engine), ConversationStore::new());

    info!("MCP server ready, serving on stdio");
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP server error");
    })?;

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}

fn load_taxonomy(config: &Config) -> Result<Arc<dyn TaxonomyLookup>, AppError> {
    let Some(path) = &config.taxonomy_path else {
        info!("no taxonomy configured, labelling branches from candidates");
        return Ok(Arc::new(NoTaxonomy));
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let taxonomy = StaticTaxonomy::from_seed_json(&raw)?;
    info!(path = %path.display(), entries = taxonomy.len(), "taxonomy loaded");
    Ok(Arc::new(taxonomy))
}
