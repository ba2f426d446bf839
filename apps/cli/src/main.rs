mod config;

use std::path::PathBuf;

use ads_core::format::{format_currency, format_number};
use ads_core::{CampaignDataset, ChunkType, QueryResponse};
use ads_rag::{chunks_of_type, CampaignChunker, IntentClassifier};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;

use crate::config::{build_pipeline, load_config, AppConfig, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "ads-rag")]
#[command(about = "Ask questions about Meta Ads campaign performance")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Campaign data file, overrides data.path
    #[arg(long)]
    data: Option<PathBuf>,
    /// Use the keyword index and canned answers even when providers are configured
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Ask {
        question: String,
        #[arg(long)]
        no_sources: bool,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer every non-empty line of a file, in order
    Batch { file: PathBuf },
    /// Show the detected intent, entities and filters
    Classify { question: String },
    /// List generated chunks
    Chunks {
        #[arg(long)]
        chunk_type: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Portfolio totals
    Summary,
    /// Pipeline backend and index statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    let cli = Cli::parse();
    let mut cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) if !cli.config.exists() => {
            tracing::warn!(error = %e, "config not found, using defaults");
            serde_yaml::from_str::<AppConfig>("{}")?
        }
        Err(e) => return Err(e),
    };
    if let Some(data) = cli.data {
        cfg.data.path = data;
    }

    match cli.command {
        Commands::Ask {
            question,
            no_sources,
            json,
        } => {
            let pipeline = build_pipeline(&cfg, cli.offline).await;
            let response = pipeline.query(&question, !no_sources).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Commands::Batch { file } => {
            let text = std::fs::read_to_string(&file)?;
            let questions: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            let pipeline = build_pipeline(&cfg, cli.offline).await;
            for response in pipeline.batch_query(&questions).await {
                print_response(&response);
                println!("{}", "-".repeat(60));
            }
        }
        Commands::Classify { question } => {
            let classifier = IntentClassifier::new();
            let intent = classifier.classify(&question);
            let keywords = classifier.search_keywords(&question, &intent);
            let out = json!({ "intent": intent, "search_keywords": keywords });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Chunks { chunk_type, limit } => {
            let dataset = CampaignDataset::load_or_empty(&cfg.data.path);
            let chunks = CampaignChunker::new(&dataset, cfg.pipeline.chunker.clone())
                .create_all_chunks();
            let selected: Vec<_> = match chunk_type.as_deref() {
                Some(name) => {
                    let ty = ChunkType::parse(name)
                        .ok_or_else(|| anyhow::anyhow!("unknown chunk type {}", name))?;
                    chunks_of_type(&chunks, ty)
                }
                None => chunks.iter().collect(),
            };
            println!("{} chunks", selected.len());
            for chunk in selected.into_iter().take(limit) {
                println!("\n[{}] {}\n{}", chunk.chunk_type(), chunk.id, chunk.content);
            }
        }
        Commands::Summary => {
            let dataset = CampaignDataset::load_or_empty(&cfg.data.path);
            let s = dataset.performance_summary();
            println!("Campaigns:        {}", s.total_campaigns);
            println!("Active campaigns: {}", s.active_campaigns);
            println!("Total spend:      {}", format_currency(s.total_spend));
            println!("Conversions:      {}", format_number(s.total_conversions));
            println!("Impressions:      {}", format_number(s.total_impressions));
            println!("Average ROAS:     {:.2}x", s.average_roas);
        }
        Commands::Stats => {
            let pipeline = build_pipeline(&cfg, cli.offline).await;
            println!("{}", serde_json::to_string_pretty(&pipeline.stats())?);
        }
    }
    Ok(())
}

fn print_response(response: &QueryResponse) {
    println!("Q: {}", response.question);
    if !response.success {
        println!("(failed, {} mode)", response.mode);
    }
    println!("{}", response.answer);
    println!(
        "\nintent: {} ({:.2}), {} mode, {} ms",
        response.intent.intent_type, response.intent.confidence, response.mode, response.latency_ms
    );
    for (i, source) in response.sources.iter().enumerate() {
        println!(
            "  [{}] {} ({}, score {:.3})\n      {}",
            i + 1,
            source.chunk_id,
            source.metadata.chunk_type,
            source.score,
            source.content
        );
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
