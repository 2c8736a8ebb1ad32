use clap::{Parser, Subcommand};
use serde::Deserialize;
use sift_search::providers::{build_embedding_provider, build_ranking_provider};
use sift_search::{
    embed_in_batches, Cache, CacheConfig, EmbeddingConfig, ExpansionConfig, JsonlDocumentStore,
    RerankerConfig, RuleBasedExpander, SearchConfig, SearchEngine, SearchRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sift", about = "sift: hybrid BM25 and dense retrieval with reranking")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the corpus for a query and print the result as JSON
    Search {
        query: String,
        /// Restrict candidates to one domain
        #[arg(short, long)]
        domain: Option<String>,
        /// Number of results (defaults to search_final_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Attach document embeddings to the hits
        #[arg(long)]
        include_embeddings: bool,
    },
    /// Compute embeddings for documents that have none and rewrite the corpus
    Embed,
    /// Run queries and print cache metrics and entries
    CacheStats {
        #[arg(required = true)]
        queries: Vec<String>,
        /// Only list entries of this namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

#[derive(Deserialize)]
struct SiftConfig {
    #[serde(default = "default_corpus")]
    corpus: PathBuf,
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    embedding: EmbeddingConfig,
    #[serde(default)]
    reranker: RerankerConfig,
    #[serde(default)]
    expansion: ExpansionConfig,
}

fn default_corpus() -> PathBuf {
    PathBuf::from("./data/corpus.jsonl")
}

async fn build_engine(config: &SiftConfig, corpus: PathBuf) -> anyhow::Result<SearchEngine> {
    let store = Arc::new(JsonlDocumentStore::open(corpus).await?);
    let embedder = build_embedding_provider(&config.embedding, config.search.embedding_timeout())?;
    let cache = Arc::new(Cache::new(config.cache.clone()));

    let mut engine = SearchEngine::new(store, embedder, cache, config.search.clone())?;
    if let Some(ranker) = build_ranking_provider(&config.reranker, config.search.rerank_timeout())? {
        engine = engine.with_ranking_provider(ranker);
    }
    if !config.expansion.groups.is_empty() {
        let expander = RuleBasedExpander::from_config(&config.expansion);
        info!(groups = expander.group_count(), "Query expansion enabled");
        engine = engine.with_expander(Arc::new(expander));
    }
    Ok(engine)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load config
    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config: SiftConfig = toml::from_str(&config_str)?;

    // Relative corpus paths are resolved against the config file
    let config_dir = cli
        .config
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .to_path_buf();
    let corpus = config_dir.join(&config.corpus);

    match cli.command {
        Commands::Search {
            query,
            domain,
            top_k,
            include_embeddings,
        } => {
            let engine = build_engine(&config, corpus).await?;
            let request = SearchRequest {
                query,
                domain,
                top_k,
                include_embeddings,
            };
            let result = engine.search(request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Embed => {
            let store = JsonlDocumentStore::open(&corpus).await?;
            let embedder =
                build_embedding_provider(&config.embedding, config.search.embedding_timeout())?;

            let missing = store.documents().missing_embeddings().await;
            if missing.is_empty() {
                info!("All documents already have embeddings");
                return Ok(());
            }

            let texts: Vec<String> = missing
                .iter()
                .map(|d| format!("{}\n{}", d.title, d.content))
                .collect();
            let vectors = embed_in_batches(embedder.as_ref(), &texts).await?;
            for (doc, vector) in missing.iter().zip(vectors) {
                store.documents().set_embedding(&doc.id, vector).await;
            }
            store.save().await?;
            info!(
                embedded = missing.len(),
                path = %store.path().display(),
                "Corpus embeddings updated"
            );
        }
        Commands::CacheStats { queries, namespace } => {
            let engine = build_engine(&config, corpus).await?;
            let sweeper = engine.start_cache_sweeper();

            for query in queries {
                let result = engine.search(SearchRequest::new(query)).await?;
                info!(
                    query = %result.query,
                    from_cache = result.from_cache,
                    results = result.ranked_documents.len(),
                    "Query done"
                );
            }

            let report = serde_json::json!({
                "metrics": engine.cache_metrics(),
                "entries": engine.cache_entries(namespace.as_deref()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            sweeper.abort();
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sift_core::Document;
    use sift_search::StoredDocument;

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from([
            "sift", "--config", "x.toml", "search", "fall risk", "-d", "nursing", "-k", "5",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        match cli.command {
            Commands::Search {
                query,
                domain,
                top_k,
                include_embeddings,
            } => {
                assert_eq!(query, "fall risk");
                assert_eq!(domain.as_deref(), Some("nursing"));
                assert_eq!(top_k, Some(5));
                assert!(!include_embeddings);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_cache_stats_requires_a_query() {
        assert!(Cli::try_parse_from(["sift", "cache-stats"]).is_err());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: SiftConfig = toml::from_str("").unwrap();
        assert_eq!(config.corpus, PathBuf::from("./data/corpus.jsonl"));
        assert_eq!(config.search.search_final_top_k, 10);
        assert_eq!(config.cache.max_size, 1000);
    }

    #[test]
    fn test_full_config() {
        let config: SiftConfig = toml::from_str(
            r#"
            corpus = "kb.jsonl"

            [search]
            bm25_weight = 0.4
            dense_weight = 0.6

            [cache]
            max_size = 50
            [cache.ttl]
            embeddings = 60

            [embedding]
            provider = "local"
            dimension = 32

            [reranker]
            provider = "none"

            [[expansion.groups]]
            canonical = "bp"
            synonyms = ["blood pressure"]
            "#,
        )
        .unwrap();
        assert_eq!(config.corpus, PathBuf::from("kb.jsonl"));
        assert_eq!(config.cache.ttl.embeddings, 60);
        assert_eq!(config.cache.ttl.vector_db, 3600);
        assert_eq!(config.embedding.dimension, 32);
        assert_eq!(config.expansion.groups.len(), 1);
    }

    #[tokio::test]
    async fn test_build_engine_and_search_local_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("kb.jsonl");
        let lines: Vec<String> = [
            Document::new("kb-1", "nursing", "Fall prevention", "Bed rails and night lights"),
            Document::new("kb-2", "nursing", "Medication", "Insulin timing"),
        ]
        .into_iter()
        .map(|d| serde_json::to_string(&StoredDocument::new(d)).unwrap())
        .collect();
        std::fs::write(&corpus, lines.join("\n")).unwrap();

        let config: SiftConfig = toml::from_str("").unwrap();
        let engine = build_engine(&config, corpus).await.unwrap();
        let result = engine.search(SearchRequest::new("fall")).await.unwrap();
        assert_eq!(result.ranked_documents[0].document.id, "kb-1");
    }
}
