//! Architecture verification: decoupling, thread-safety, and the
//! persisted-state layout invariants named in the design (§6.6).

use codegen_core::artifact::store::ArtifactStore;
use codegen_core::artifact::ArtifactKind;
use codegen_core::collaborators::{Embedder, FastEmbedEmbedder, FileVectorStore, LlmBackend, OllamaBackend, OpenAiCompatBackend};
use codegen_core::config::AppConfig;
use codegen_core::escalation::EscalationController;
use codegen_core::evolution::EvolutionController;
use codegen_core::model_registry::ModelRegistry;
use codegen_core::pins::PinRegistry;
use codegen_core::pipeline::Pipeline;
use codegen_core::queue::JobQueue;
use codegen_core::status_bus::StatusBus;
use codegen_core::tools::ToolDescriptor;

fn assert_send_sync<T: Send + Sync>() {}

// Collaborator traits (C1-C3) and their reference implementations must be
// usable from any worker in a concurrent pool.
#[test]
fn collaborators_are_thread_safe() {
    assert_send_sync::<FastEmbedEmbedder>();
    assert_send_sync::<FileVectorStore>();
    assert_send_sync::<OllamaBackend>();
    assert_send_sync::<OpenAiCompatBackend>();
    assert_send_sync::<Box<dyn Embedder>>();
    assert_send_sync::<Box<dyn LlmBackend>>();
}

// Every core component (C4-C15) is Send + Sync: the pipeline's collaborators
// are all shared behind Arc across concurrent requests.
#[test]
fn core_components_are_thread_safe() {
    assert_send_sync::<ModelRegistry>();
    assert_send_sync::<ArtifactStore>();
    assert_send_sync::<PinRegistry>();
    assert_send_sync::<EscalationController>();
    assert_send_sync::<EvolutionController>();
    assert_send_sync::<JobQueue>();
    assert_send_sync::<Pipeline>();
    assert_send_sync::<ToolDescriptor>();
}

// §6.6: ArtifactStore routes sidecars into kind-specific subtrees rather
// than a single flat directory.
#[tokio::test]
async fn artifact_store_creates_the_documented_subtree_layout() {
    let dir = tempfile::tempdir().unwrap();
    let embedder: std::sync::Arc<dyn Embedder> = std::sync::Arc::new(StubEmbedder);
    let vectors = std::sync::Arc::new(FileVectorStore::new(dir.path().join("vectors.json")).await.unwrap());
    let _store = ArtifactStore::new(dir.path(), embedder, vectors).await.unwrap();

    for sub in ["artifacts", "evaluations", "performance", "recipes"] {
        assert!(dir.path().join(sub).is_dir(), "missing subtree: {sub}");
    }
}

// §6.6: an EVALUATION artifact lands under evaluations/, not artifacts/.
#[tokio::test]
async fn evaluation_artifacts_land_in_their_own_subtree() {
    use codegen_core::Artifact;

    let dir = tempfile::tempdir().unwrap();
    let embedder: std::sync::Arc<dyn Embedder> = std::sync::Arc::new(StubEmbedder);
    let vectors = std::sync::Arc::new(FileVectorStore::new(dir.path().join("vectors.json")).await.unwrap());
    let store = ArtifactStore::new(dir.path(), embedder, vectors).await.unwrap();

    let artifact = Artifact::new(ArtifactKind::Evaluation, "eval", "a test run", "{}");
    let stored = store.store(artifact, false, false).await.unwrap();

    assert!(dir.path().join("evaluations").join(format!("{}.json", stored.id)).exists());
    assert!(!dir.path().join("artifacts").join(format!("{}.json", stored.id)).exists());
}

// IA4: with every backend but the local free one disabled, the registry
// never resolves to anything but that free backend.
#[test]
fn model_registry_excludes_disabled_paid_backends() {
    let mut config = AppConfig::default();
    for backend in config.backends.values_mut() {
        backend.enabled = false;
    }
    config.backends.insert(
        "ollama".to_string(),
        codegen_core::config::BackendConfig {
            enabled: true,
            base_url: Some("http://localhost:11434".to_string()),
            model_map: Default::default(),
            cost_tier: "free".to_string(),
        },
    );
    let registry = ModelRegistry::from_config(&config);
    let picked = registry
        .pick(codegen_core::model_registry::Role::General, codegen_core::model_registry::Tier::God)
        .unwrap();
    assert_eq!(picked.backend, "ollama");
}

struct StubEmbedder;

#[async_trait::async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let b = (text.len() % 10) as f32 / 10.0;
        Ok(vec![b, 1.0 - b])
    }
    fn dim(&self) -> usize {
        2
    }
}
