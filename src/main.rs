//! CLI surface (§6.4): `classify`, `generate`, `run`, `list`, `evaluate`.
//!
//! Grounded on the teacher's binary entry point for the "load config, wire
//! collaborators, dispatch subcommand" shape; clap's derive API is pulled
//! in the way `weave-logic-ai-clawft` uses it (see DESIGN.md) since the
//! teacher itself carries no CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use codegen_core::artifact::store::ArtifactStore;
use codegen_core::cache::SemanticCache;
use codegen_core::classifier::TaskClassifier;
use codegen_core::collaborators::{Embedder, FastEmbedEmbedder, FileVectorStore, LlmBackend, OllamaBackend};
use codegen_core::escalation::EscalationController;
use codegen_core::generator::Generator;
use codegen_core::model_registry::ModelRegistry;
use codegen_core::pins::PinRegistry;
use codegen_core::pipeline::{Pipeline, Request};
use codegen_core::planner::Planner;
use codegen_core::pressure::PressureManager;
use codegen_core::sandbox::Sandbox;
use codegen_core::status_bus::StatusBus;
use codegen_core::test_orchestrator::TestOrchestrator;
use codegen_core::validation::ValidationPipeline;
use codegen_core::{AppConfig, ArtifactKind};

#[derive(Parser)]
#[command(name = "codegen-core", version, about = "Self-improving code-generation core")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints the ClassificationResult for a description.
    Classify { description: String },
    /// Runs the full pipeline for a request.
    Generate {
        id: String,
        title: String,
        description: String,
        #[arg(long)]
        input: Option<String>,
    },
    /// Executes a stored artifact.
    Run {
        id: String,
        #[arg(long)]
        input: String,
    },
    /// Lists stored artifacts.
    List {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Re-runs the stored tests for an artifact.
    Evaluate { id: String },
    /// Marks an artifact pinned: exempt from trim and evolution replacement.
    Pin { id: String, reason: String },
    /// Clears a pin set by `pin`.
    Unpin { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{{\"error\":{}}}", serde_json::to_string(&e.to_string()).unwrap());
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = Context::build(&config).await?;

    match cli.command {
        Command::Classify { description } => {
            let result = ctx.classifier.classify(&description).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(0)
        }
        Command::Generate { id, title, description, input } => {
            let input = input.map(|s| serde_json::from_str(&s)).transpose()?;
            let request = Request {
                request_id: id,
                description: format!("{title}: {description}"),
                user_context: None,
                pressure_hint: None,
                deadline: None,
            };
            let outcome = ctx.pipeline.handle(&request, input).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(if outcome.ready { 0 } else { 2 })
        }
        Command::Run { id, input } => {
            let input: serde_json::Value = serde_json::from_str(&input)?;
            let artifact = ctx
                .store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such artifact: {id}"))?;
            let req = codegen_core::sandbox::SandboxRequest {
                source: &artifact.content,
                stdin_json: &input,
                timeout: std::time::Duration::from_millis(ctx.config.pressure.medium.max_latency_ms),
                grace_ms: ctx.config.pressure.grace_ms,
                scratch_dir: Path::new(&ctx.config.root).join("scratch").join(&request_scratch_name()),
                env_allowlist: &[],
            };
            let outcome = ctx.sandbox.run(req).await?;
            print!("{}", outcome.stdout);
            Ok(outcome.exit_code)
        }
        Command::List { kind, tags } => {
            let kind = kind.map(|k| parse_kind(&k)).transpose()?;
            let artifacts = if let Some(kind) = kind {
                ctx.store.find_by_tags(&tags, true).await?.into_iter().filter(|a| a.kind == kind).collect::<Vec<_>>()
            } else {
                ctx.store.find_by_tags(&tags, true).await?
            };
            for artifact in artifacts {
                println!(
                    "{}\t{:?}\t{}\t{}",
                    artifact.id,
                    artifact.kind,
                    artifact.name,
                    artifact.metadata.quality_score.map(|q| format!("{q:.2}")).unwrap_or_else(|| "-".to_string())
                );
            }
            Ok(0)
        }
        Command::Evaluate { id } => {
            let artifact = ctx
                .store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such artifact: {id}"))?;
            let classification = ctx.classifier.classify(&artifact.description).await;
            let spec = codegen_core::planner::Specification {
                problem_definition: artifact.description.clone(),
                io_interface: String::new(),
                algorithmic_requirements: String::new(),
                safety_caps: codegen_core::planner::SafetyCaps {
                    max_sequence_elements: 10_000,
                    max_loop_iterations: 1_000,
                    max_file_size_mb: 10,
                    soft_timeout_ms: ctx.config.pressure.medium.max_latency_ms,
                },
                test_cases: Vec::new(),
                recommended_tools: Vec::new(),
                diff_sections: None,
                truncated: false,
            };
            let scratch_dir = Path::new(&ctx.config.root).join("scratch").join(&id);
            let report = ctx
                .tests
                .evaluate(&artifact.content, &spec, classification.task_type, std::time::Duration::from_millis(spec.safety_caps.soft_timeout_ms), scratch_dir)
                .await;
            match report {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    if report.pass_rate >= 0.999 {
                        Ok(0)
                    } else {
                        Ok(2)
                    }
                }
                Err(e) => {
                    eprintln!("environmental error: {e}");
                    Ok(1)
                }
            }
        }
        Command::Pin { id, reason } => {
            let mut artifact = ctx
                .store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such artifact: {id}"))?;
            artifact.metadata.pinned = true;
            ctx.store.store(artifact, false, true).await?;
            ctx.pins.pin(&id, reason, None).await?;
            Ok(0)
        }
        Command::Unpin { id } => {
            let mut artifact = ctx
                .store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such artifact: {id}"))?;
            artifact.metadata.pinned = false;
            ctx.store.store(artifact, false, true).await?;
            ctx.pins.unpin(&id).await?;
            Ok(0)
        }
    }
}

fn request_scratch_name() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn parse_kind(raw: &str) -> anyhow::Result<ArtifactKind> {
    match raw.to_ascii_lowercase().as_str() {
        "function" => Ok(ArtifactKind::Function),
        "workflow" => Ok(ArtifactKind::Workflow),
        "plan" => Ok(ArtifactKind::Plan),
        "pattern" => Ok(ArtifactKind::Pattern),
        "evaluation" => Ok(ArtifactKind::Evaluation),
        "performance" => Ok(ArtifactKind::Performance),
        "failure" => Ok(ArtifactKind::Failure),
        other => anyhow::bail!("unknown artifact kind: {other}"),
    }
}

/// The collaborator stack, wired once per process per §4.1/§6.5.
struct Context {
    config: AppConfig,
    classifier: TaskClassifier,
    store: Arc<ArtifactStore>,
    pins: PinRegistry,
    sandbox: Sandbox,
    tests: TestOrchestrator,
    pipeline: Pipeline,
}

impl Context {
    async fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let status = StatusBus::new(256);
        let embedder: Arc<dyn Embedder> = Arc::new(FastEmbedEmbedder::new()?);
        let vectors = Arc::new(FileVectorStore::new(Path::new(&config.root).join("vectors.json")).await?);
        let store = Arc::new(ArtifactStore::new(&config.root, embedder.clone(), vectors).await?);
        let pins = PinRegistry::new(Path::new(&config.root).join("pins.json")).await?;

        let llm = build_llm_backend(config, status.clone())?;
        let registry = Arc::new(ModelRegistry::from_config(config));
        let classifier = TaskClassifier::new(llm.clone(), default_triage_model(&registry));
        let cache = SemanticCache::new(store.clone(), llm.clone(), default_triage_model(&registry), config.cache.clone());

        let sandbox = Sandbox::new("python3");
        let tests = TestOrchestrator::new(Sandbox::new("python3"), embedder.clone(), config.cache.gate1);

        let escalation = EscalationController::new(
            Planner::new(llm.clone()),
            Generator::new(llm.clone()),
            ValidationPipeline::new(config.validation.clone(), Some(store.clone())),
            TestOrchestrator::new(Sandbox::new("python3"), embedder.clone(), config.cache.gate1),
            registry.clone(),
            store.clone(),
            config.escalation.clone(),
        );

        let pressure = PressureManager::new(config.pressure.clone());
        let scratch_root = Path::new(&config.root).join("scratch");

        let pipeline = Pipeline::new(
            TaskClassifier::new(llm.clone(), default_triage_model(&registry)),
            cache,
            store.clone(),
            Planner::new(llm.clone()),
            Generator::new(llm.clone()),
            ValidationPipeline::new(config.validation.clone(), Some(store.clone())),
            TestOrchestrator::new(Sandbox::new("python3"), embedder.clone(), config.cache.gate1),
            escalation,
            Sandbox::new("python3"),
            registry,
            pressure,
            config.clone(),
            scratch_root,
        );

        Ok(Self {
            config: config.clone(),
            classifier,
            store,
            pins,
            sandbox,
            tests,
            pipeline,
        })
    }
}

fn default_triage_model(registry: &ModelRegistry) -> String {
    registry
        .pick(codegen_core::model_registry::Role::General, codegen_core::model_registry::Tier::VeryFast)
        .map(|d| d.id)
        .unwrap_or_else(|_| "llama3.2:1b".to_string())
}

/// Picks the first `enabled=true` backend from config, defaulting to a
/// local Ollama instance. The core never contacts a paid backend unless
/// its own config entry opts in (§6.5).
fn build_llm_backend(config: &AppConfig, status: StatusBus) -> anyhow::Result<Arc<dyn LlmBackend>> {
    if let Some(ollama) = config.backends.get("ollama").filter(|b| b.enabled) {
        let (host, port) = split_base_url(ollama.base_url.as_deref().unwrap_or("http://localhost:11434"));
        return Ok(Arc::new(OllamaBackend::new(host, port, status)));
    }
    for (name, backend) in &config.backends {
        if name != "ollama" && backend.enabled {
            let base_url = backend
                .base_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("backend {name} is enabled but has no base_url"))?;
            let api_key = std::env::var(format!("{}_API_KEY", name.to_ascii_uppercase())).ok();
            return Ok(Arc::new(codegen_core::collaborators::OpenAiCompatBackend::new(base_url, api_key, status)));
        }
    }
    anyhow::bail!("no enabled backend configured")
}

fn split_base_url(url: &str) -> (String, u16) {
    match url.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
            (host.to_string(), port.parse().unwrap_or(11434))
        }
        _ => (url.to_string(), 11434),
    }
}
