//! mentor CLI: run the proactive mentor over a segment stream, inspect packs.

use clap::{Parser, Subcommand};
use mentor_core::config::{Config, MentorConfig};
use mentor_core::db::{Db, PgVectorIndex};
use mentor_core::gate::RateGate;
use mentor_core::kv::KvStore;
use mentor_core::llm::{
    Embedder, ReasoningModel, RigEmbedder, RigReasoningModel, TrackedModel, anthropic_client,
    openai_client,
};
use mentor_core::memory::MemoryPackAssembler;
use mentor_core::mentor::{ContextBuilder, MentorPipeline, ProactiveEvaluator};
use mentor_core::model::TranscriptSegment;
use mentor_core::ports::VectorIndex;
use mentor_core::service::MentorService;
use mentor_core::telemetry::{TelemetryConfig, init_telemetry};
use mentor_core::usage::UsageTracker;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mentor", about = "Proactive mentor notifications from live transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read JSON-lines segment batches from stdin and run the mentor
    Serve,
    /// Print a user's memory pack and its version hash
    Pack {
        uid: String,
        /// Pack size
        #[arg(long, default_value_t = mentor_core::memory::DEFAULT_K)]
        k: usize,
        /// Retrieve semantically against this text instead of by score
        #[arg(long)]
        context: Option<String>,
    },
}

/// One stdin line.
#[derive(Deserialize)]
struct SegmentBatch {
    session_id: String,
    uid: String,
    segments: Vec<TranscriptSegment>,
    /// Dispatch on trigger without waiting for the bound or idle timeout.
    #[serde(default)]
    immediate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mentor = config.mentor()?;

    match cli.command {
        Command::Serve => cmd_serve(&config, &mentor).await,
        Command::Pack { uid, k, context } => cmd_pack(&config, &mentor, &uid, k, context).await,
    }
}

struct Stack {
    db: Arc<Db>,
    vectors: Option<Arc<dyn VectorIndex>>,
    assembler: Arc<MemoryPackAssembler>,
}

async fn connect(config: &Config, mentor: &MentorConfig) -> anyhow::Result<Stack> {
    let db = Db::connect_with(
        config.database_url.expose_secret(),
        config.db_max_connections,
    )
    .await?;
    let db = Arc::new(db);
    db.migrate().await?;

    let vectors: Option<Arc<dyn VectorIndex>> = match &config.openai_api_key {
        Some(key) => {
            let embedder: Arc<dyn Embedder> = Arc::new(RigEmbedder::new(
                openai_client(key)?,
                mentor.embedding_model.clone(),
            ));
            Some(Arc::new(PgVectorIndex::new(Arc::clone(&db), embedder)))
        }
        None => {
            warn!("OPENAI_API_KEY not set, semantic retrieval disabled");
            None
        }
    };

    let kv: Arc<dyn KvStore> = db.clone();
    let assembler = Arc::new(
        MemoryPackAssembler::new(db.clone(), vectors.clone(), db.clone(), kv)
            .with_cache_ttl(mentor.prompt_cache_ttl),
    );
    Ok(Stack {
        db,
        vectors,
        assembler,
    })
}

async fn cmd_serve(config: &Config, mentor: &MentorConfig) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_config(config, "mentor"))?;
    let Stack {
        db,
        vectors,
        assembler,
    } = connect(config, mentor).await?;

    let usage = UsageTracker::global();
    let model: Arc<dyn ReasoningModel> = Arc::new(TrackedModel::new(
        RigReasoningModel::new(
            anthropic_client(&config.anthropic_api_key)?,
            mentor.reasoning_model.clone(),
        ),
        Arc::clone(&usage),
    ));

    let gate = Arc::new(RateGate::new(db.clone(), mentor.daily_max));
    let context = ContextBuilder::new(
        assembler,
        db.clone(),
        db.clone(),
        vectors,
        db.clone(),
        db.clone(),
        mentor.memory_k,
    );
    let pipeline = Arc::new(MentorPipeline::new(
        mentor,
        db.clone(),
        gate,
        context,
        ProactiveEvaluator::new(model),
        db.clone(),
    ));

    let service = MentorService::new(mentor, pipeline, usage).with_usage_sink(db.clone());
    let scheduler = service.start();
    info!(capability = %mentor.capability, "mentor serving, reading segments from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            // Let sessions still recording reach their idle timeout.
            tokio::time::sleep(mentor.idle_timeout + mentor.scheduler_tick).await;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SegmentBatch>(&line) {
            Ok(batch) => {
                if batch.immediate {
                    service.set_immediate(&batch.session_id, &batch.uid, true);
                }
                service.ingest(&batch.session_id, &batch.uid, &batch.segments);
            }
            Err(e) => warn!(error = %e, "skipping malformed segment batch"),
        }
    }

    service.shutdown(scheduler).await;
    if let Ok(purged) = db.purge_expired_kv().await {
        info!(purged, "expired kv entries removed");
    }
    Ok(())
}

async fn cmd_pack(
    config: &Config,
    mentor: &MentorConfig,
    uid: &str,
    k: usize,
    context: Option<String>,
) -> anyhow::Result<()> {
    let stack = connect(config, mentor).await?;
    let pack = stack.assembler.get_pack(uid, k, context.as_deref()).await?;

    println!("User:     {}", pack.user_name);
    println!("Version:  {}", pack.version_hash);
    println!("Memories: {} user-made, {} generated", pack.user_made.len(), pack.generated.len());
    println!("---");
    println!("{}", pack.formatted());
    Ok(())
}
