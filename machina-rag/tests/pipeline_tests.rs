//! End-to-end: ingest a document store, prepare the index, and answer questions.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use machina_rag::error::RagError;
use machina_rag::manager::{IndexManager, IndexOrigin, SOURCE_DIR};
use machina_rag::mock::{FailingEmbeddingProvider, HashEmbeddingProvider, ScriptedModel};
use machina_rag::pipeline::MachiningAdvisor;
use machina_rag::schema::FieldDescriptor;
use machina_rag::snapshot;
use machina_rag::{RagConfig, VectorIndex};

const GOOD: &str = r#"{"toolType": "3-flute carbide endmill", "diameter": 0.5}"#;

fn fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("toolType", "string", "recommended tool"),
        FieldDescriptor::new("diameter", "number", "diameter in inches"),
    ]
}

fn write_sources(store: &Path) {
    let dir = store.join(SOURCE_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("aluminum.txt"),
        "Aluminum pockets machine best with a 3-flute carbide endmill and flood coolant.",
    )
    .unwrap();
    fs::write(
        dir.join("steel.txt"),
        "Hardened steel needs a coated 5-flute endmill at low speed.",
    )
    .unwrap();
    fs::write(dir.join("drilling.md"), "Peck drilling clears chips from deep holes in cast iron.")
        .unwrap();
    fs::write(dir.join("notes.csv"), "ignored,file").unwrap();
}

fn hashed() -> Arc<HashEmbeddingProvider> {
    Arc::new(HashEmbeddingProvider::new(64))
}

fn small_config() -> RagConfig {
    RagConfig::builder().chunk_size(200).chunk_overlap(20).top_k(10).build().unwrap()
}

fn advisor(index: VectorIndex, model: Arc<ScriptedModel>) -> MachiningAdvisor {
    MachiningAdvisor::builder()
        .config(small_config())
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(64)))
        .language_model(model)
        .index(index)
        .build()
        .unwrap()
}

#[tokio::test]
async fn first_start_builds_and_saves_snapshot() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    let embedder = Arc::new(HashEmbeddingProvider::new(64));

    let manager = IndexManager::new(temp.path(), small_config(), embedder.clone());
    let prepared = manager.prepare(false).await.unwrap();

    assert_eq!(prepared.origin, IndexOrigin::Rebuilt);
    assert_eq!(prepared.index.len(), 3);
    assert_eq!(embedder.embedded(), 3);
    assert!(snapshot::exists(temp.path()));
}

#[tokio::test]
async fn custom_source_dir_replaces_default_folder() {
    let store = tempfile::tempdir().unwrap();
    write_sources(store.path());
    let other = tempfile::tempdir().unwrap();
    fs::write(other.path().join("boring.txt"), "Boring bars open bores to final size.").unwrap();

    let prepared = IndexManager::new(store.path(), small_config(), hashed())
        .with_source_dir(other.path())
        .prepare(false)
        .await
        .unwrap();

    assert_eq!(prepared.index.len(), 1);
    assert_eq!(prepared.index.entries()[0].chunk.text, "Boring bars open bores to final size.");
    assert!(snapshot::exists(store.path()));
}

#[tokio::test]
async fn restart_loads_snapshot_without_embedding() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    let built = IndexManager::new(temp.path(), small_config(), hashed())
        .prepare(false)
        .await
        .unwrap();

    let embedder = Arc::new(HashEmbeddingProvider::new(64));
    let reloaded = IndexManager::new(temp.path(), small_config(), embedder.clone())
        .prepare(false)
        .await
        .unwrap();

    assert_eq!(reloaded.origin, IndexOrigin::Snapshot);
    assert_eq!(reloaded.index, built.index);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn forced_rebuild_picks_up_new_sources() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    let embedder = Arc::new(HashEmbeddingProvider::new(64));
    let manager = IndexManager::new(temp.path(), small_config(), embedder.clone());
    manager.prepare(false).await.unwrap();

    let titanium = temp.path().join(SOURCE_DIR).join("titanium.txt");
    fs::write(titanium, "Titanium wants sharp tools.").unwrap();
    let prepared = manager.prepare(true).await.unwrap();

    assert_eq!(prepared.origin, IndexOrigin::Rebuilt);
    assert_eq!(prepared.index.len(), 4);
    assert_eq!(snapshot::load(temp.path()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn failed_rebuild_falls_back_to_previous_snapshot() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    let original = IndexManager::new(temp.path(), small_config(), hashed())
        .prepare(false)
        .await
        .unwrap();

    let failing = Arc::new(FailingEmbeddingProvider);
    let prepared = IndexManager::new(temp.path(), small_config(), failing)
        .prepare(true)
        .await
        .unwrap();

    assert_eq!(prepared.origin, IndexOrigin::FallbackSnapshot);
    assert_eq!(prepared.index, original.index);
}

#[tokio::test]
async fn failed_rebuild_without_snapshot_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());

    let result = IndexManager::new(temp.path(), small_config(), Arc::new(FailingEmbeddingProvider))
        .prepare(false)
        .await;

    assert!(matches!(result, Err(RagError::EmbeddingError { .. })));
    assert!(!snapshot::exists(temp.path()));
}

#[tokio::test]
async fn corrupt_snapshot_is_rebuilt() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    fs::write(snapshot::snapshot_path(temp.path()), "{ not json").unwrap();

    let prepared = IndexManager::new(temp.path(), small_config(), hashed())
        .prepare(false)
        .await
        .unwrap();

    assert_eq!(prepared.origin, IndexOrigin::Rebuilt);
    assert_eq!(prepared.index.len(), 3);
}

#[tokio::test]
async fn empty_store_gives_empty_index_and_empty_search() {
    let temp = tempfile::tempdir().unwrap();
    let prepared = IndexManager::new(temp.path(), small_config(), hashed())
        .prepare(false)
        .await
        .unwrap();
    assert!(prepared.index.is_empty());

    let model = Arc::new(ScriptedModel::with_texts([GOOD]));
    let advisor = advisor(prepared.index, model.clone());

    assert!(advisor.similarity_search("carbide").await.unwrap().is_empty());

    // The model is still asked, with empty context.
    let response = advisor.suggest_tool("Which endmill?", &fields()).await.unwrap();
    assert_eq!(response.value["toolType"], "3-flute carbide endmill");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn similarity_search_ranks_matching_source_first() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    let prepared = IndexManager::new(temp.path(), small_config(), hashed())
        .prepare(false)
        .await
        .unwrap();
    let advisor = advisor(prepared.index, Arc::new(ScriptedModel::default()));

    let results = advisor.similarity_search("peck drilling deep holes").await.unwrap();

    assert!(!results.is_empty() && results.len() <= 10);
    assert!(results[0].chunk.text.contains("Peck drilling"));
    assert!(results[0].chunk.metadata["source"].ends_with("drilling.md"));
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn suggest_tool_uses_retrieved_context() {
    let temp = tempfile::tempdir().unwrap();
    write_sources(temp.path());
    let prepared = IndexManager::new(temp.path(), small_config(), hashed())
        .prepare(false)
        .await
        .unwrap();
    let model = Arc::new(ScriptedModel::with_texts([GOOD]));
    let advisor = advisor(prepared.index, model.clone());

    let response = advisor
        .suggest_tool("Which endmill for an aluminum pocket with coolant?", &fields())
        .await
        .unwrap();

    assert_eq!(response.repair_attempts, 0);
    assert_eq!(response.value.len(), 2);
    let prompt = &model.requests()[0].prompt;
    assert!(prompt.contains("Aluminum pockets machine best"));
    assert!(prompt.contains("Which endmill for an aluminum pocket with coolant?"));
}

#[test]
fn builder_requires_model_and_embedder() {
    let missing_model = MachiningAdvisor::builder()
        .embedding_provider(Arc::new(HashEmbeddingProvider::new(8)))
        .build();
    assert!(matches!(missing_model, Err(RagError::ConfigError(_))));

    let missing_embedder = MachiningAdvisor::builder()
        .language_model(Arc::new(ScriptedModel::default()))
        .build();
    assert!(matches!(missing_embedder, Err(RagError::ConfigError(_))));
}
