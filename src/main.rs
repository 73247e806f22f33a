use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use vidsearch::agents::{
    Executor, KeywordExpansion, Orchestrator, TemporalExecutor, TextSearchExecutor, VisualSearchExecutor,
};
use vidsearch::cli::{Cli, Commands, ConfigAction};
use vidsearch::config::Config;
use vidsearch::embedding::{
    EmbeddingProvider, FastEmbedProvider, HnswParams, KeyframePayload, KeywordPayload, VectorCollection,
};
use vidsearch::llm::{Classifier, GeminiClassifier};
use vidsearch::session::{SearchResponse, SearchSession};
use vidsearch::storage::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Query { query, limit, json } => {
            let config = load_config(cli.config, cli.profile)?;
            let mut session = build_session(&config)?;
            let response = session.search(&query).await;
            print_response(&response, limit, json)?;
        }
        Commands::Batch { file, json, output } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_batch(&config, &file, json, output.as_deref()).await?;
        }
        Commands::Repl => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_repl(&config).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "vidsearch=debug" } else { "vidsearch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Wire the stores, models and executors named by `config` into a session
///
/// Visual search and keyword expansion need a vector snapshot on disk; when
/// one is missing the corresponding feature is left out with a warning.
fn build_session(config: &Config) -> anyhow::Result<SearchSession> {
    let db_path = expand_path(&config.storage.database_path)?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let db = Arc::new(Database::new(&db_path)?);

    let classifier: Arc<dyn Classifier> = Arc::new(GeminiClassifier::from_config(&config.llm)?);
    let params = HnswParams::from(&config.indexing);

    let mut text = TextSearchExecutor::new(Arc::clone(&db), classifier.clone(), config);
    if config.text.keyword_expansion {
        match load_keyword_expansion(config, params) {
            Ok(expansion) => text = text.with_keyword_expansion(expansion),
            Err(e) => tracing::warn!("Keyword expansion disabled: {:#}", e),
        }
    }

    let mut orchestrator = Orchestrator::from_config(classifier.clone(), config)
        .with_executor(Executor::Text(Arc::new(text)))
        .with_executor(Executor::Temporal(Arc::new(TemporalExecutor::new(
            Arc::clone(&db),
            classifier.clone(),
            config,
        )?)));

    match load_visual(config, params) {
        Ok((embedder, keyframes)) => {
            let visual = VisualSearchExecutor::new(Arc::clone(&db), classifier, embedder, keyframes, config)?;
            orchestrator = orchestrator.with_executor(Executor::Visual(Arc::new(visual)));
        }
        Err(e) => tracing::warn!("Visual search disabled: {:#}", e),
    }

    tracing::info!(
        "Agents ready: {}",
        orchestrator
            .registered_agents()
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(SearchSession::new(orchestrator, config.history.max_entries))
}

fn load_keyword_expansion(config: &Config, params: HnswParams) -> anyhow::Result<KeywordExpansion> {
    let path = expand_path(&config.storage.keyword_snapshot())?;
    let collection = VectorCollection::<KeywordPayload>::load(&path, params)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FastEmbedProvider::new(&config.embedding.keyword_model)?);

    Ok(KeywordExpansion {
        embedder,
        collection: Arc::new(collection),
    })
}

type VisualStores = (Arc<dyn EmbeddingProvider>, Arc<VectorCollection<KeyframePayload>>);

fn load_visual(config: &Config, params: HnswParams) -> anyhow::Result<VisualStores> {
    let path = expand_path(&config.storage.keyframe_snapshot())?;
    let collection = VectorCollection::<KeyframePayload>::load(&path, params)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(FastEmbedProvider::new(&config.embedding.visual_model)?);

    Ok((embedder, Arc::new(collection)))
}

async fn cmd_batch(config: &Config, file: &Path, json: bool, output: Option<&Path>) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read query file {}", file.display()))?;
    let queries: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    let mut session = build_session(config)?;
    let responses = session.batch_search(&queries).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&responses)?);
    } else {
        for (i, response) in responses.iter().enumerate() {
            println!("[{}/{}]", i + 1, responses.len());
            print_response(response, 5, false)?;
        }
        print_stats(&session)?;
    }

    if let Some(path) = output {
        session.export_history(path)?;
        println!("✓ History written to {}", path.display());
    }

    Ok(())
}

async fn cmd_repl(config: &Config) -> anyhow::Result<()> {
    let mut session = build_session(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("vidsearch interactive mode (:stats, :quit)");

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":stats" => print_stats(&session)?,
            query => {
                let response = session.search(query).await;
                print_response(&response, 5, false)?;
            }
        }
    }

    Ok(())
}

fn print_response(response: &SearchResponse, limit: usize, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("Query:       {}", response.query);
    if let Some(error) = &response.error {
        println!("✗ Search failed: {}", error);
        return Ok(());
    }
    println!("Confidence:  {:.2}", response.confidence);
    println!("Time:        {:.2}s", response.processing_time);
    println!("Agents:      {}", response.agents_used.join(", "));
    println!("Results:     {}", response.total_results);
    println!("Explanation: {}", response.explanation);

    for (i, result) in response.results.iter().take(limit).enumerate() {
        println!(
            "  {}. {}/{} (score: {:.3}) {}",
            i + 1,
            result.video_id,
            result.keyframe_id.as_deref().unwrap_or("N/A"),
            result.score,
            result.explanation
        );
    }

    Ok(())
}

fn print_stats(session: &SearchSession) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&session.stats())?);
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<String>, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> anyhow::Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'vidsearch config init' to create one.");
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    let config = match profile {
        Some(profile) => Config::load_with_profile(&path, &profile)?,
        None => Config::load(&path)?,
    };
    Ok(config)
}

fn expand_path(path: &Path) -> anyhow::Result<PathBuf> {
    let path_str = path.to_str().context("Invalid path encoding")?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
