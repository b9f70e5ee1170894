use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use raglab_core::config::RetrievalConfig;
use raglab_core::error::{Error, Result};
use raglab_core::traits::{CollectionStore, Embedder};
use raglab_core::types::{Chunk, ChunkingMethod, RetrievalMethod, VectorCollection};
use raglab_embed::EmbeddingHandle;
use raglab_hybrid::{rank, RetrievalOrchestrator, SearchRequest, DENSE_WEIGHT, SPARSE_WEIGHT};
use raglab_text::{bm25_scores, normalize_by_max};
use raglab_vector::{cosine_all, MemoryStore};

const VOCAB: [&str; 4] = ["cat", "dog", "fish", "bird"];

/// Bag of animal words, L2-normalized.
fn vectorize(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dim(&self) -> usize { VOCAB.len() }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|t| vectorize(t)).collect()) }
}

fn counting_handle() -> (EmbeddingHandle, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let handle = EmbeddingHandle::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(KeywordEmbedder) as Arc<dyn Embedder>)
    });
    (handle, calls)
}

fn collection(id: &str, texts: &[&str]) -> VectorCollection {
    let chunks = texts
        .iter()
        .enumerate()
        .map(|(i, t)| Chunk {
            id: format!("{id}:{i}"),
            index: i,
            text: t.to_string(),
            source_file_name: format!("{id}.txt"),
            chunk_method: ChunkingMethod::Sentence,
        })
        .collect();
    let vectors = texts.iter().map(|t| vectorize(t)).collect();
    VectorCollection::new(id.into(), format!("{id}.txt · Sentence Based"), Utc::now(), format!("{id}.txt"), ChunkingMethod::Sentence, chunks, vectors)
        .unwrap()
}

const PETS: [&str; 8] = [
    "The cat sleeps on the mat.",
    "A dog barks at the mailman.",
    "The fish swims in a bowl.",
    "A bird sings at dawn.",
    "The cat and the dog are friends.",
    "Nobody saw the fish or the bird.",
    "Cat cat cat, said the cat.",
    "Weather report: sunny.",
];

async fn pets_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.put(&collection("pets", &PETS)).await.unwrap();
    store
}

fn request(query: &str, ids: &[&str], methods: &[RetrievalMethod], top_k: usize) -> SearchRequest {
    SearchRequest {
        query: query.into(),
        collection_ids: ids.iter().map(|s| s.to_string()).collect(),
        config: RetrievalConfig::new(methods.iter().copied(), top_k),
    }
}

#[tokio::test]
async fn hybrid_score_is_exact_weighted_fusion() {
    let store = pets_store().await;
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let query = "cat and dog";
    let resp = orch.search(&store, request(query, &["pets"], &[RetrievalMethod::Hybrid], 20)).await.unwrap();
    assert_eq!(resp.results.len(), PETS.len());

    let dense = cosine_all(&vectorize(query), &PETS.iter().map(|t| vectorize(t)).collect::<Vec<_>>()).unwrap();
    let sparse = normalize_by_max(&bm25_scores(query, &PETS));
    for r in &resp.results {
        assert_eq!(r.retrieval_method, RetrievalMethod::Hybrid);
        let i = r.chunk.index;
        assert_eq!(r.score, DENSE_WEIGHT * dense[i] + SPARSE_WEIGHT * sparse[i], "chunk {i}");
    }
}

#[tokio::test]
async fn results_are_bounded_by_top_k_times_methods_and_sorted() {
    let store = pets_store().await;
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let resp = orch
        .search(&store, request("cat", &["pets"], &[RetrievalMethod::Dense, RetrievalMethod::Sparse], 5))
        .await
        .unwrap();
    assert!(resp.results.len() <= 10);
    assert_eq!(resp.results.len(), 10, "16 candidates are cut to the budget");
    for pair in resp.results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "{} then {}", pair[0].score, pair[1].score);
    }
    assert_eq!(resp.results[0].score, 1.0);
    assert_eq!(resp.results[0].retrieval_method, RetrievalMethod::Dense, "ties keep evaluation order");
}

#[tokio::test]
async fn fewer_candidates_than_budget_returns_all() {
    let store = MemoryStore::new();
    store.put(&collection("tiny", &["cat", "dog"])).await.unwrap();
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);
    let resp = orch.search(&store, request("cat", &["tiny"], &[RetrievalMethod::Dense], 5)).await.unwrap();
    assert_eq!(resp.results.len(), 2);
}

#[tokio::test]
async fn empty_selection_fails_before_embedding() {
    let store = pets_store().await;
    let (handle, calls) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let err = orch.search(&store, request("cat", &[], &[RetrievalMethod::Dense], 5)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!orch.embedder().is_initialized());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let store = pets_store().await;
    let (handle, calls) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    for req in [
        request("   ", &["pets"], &[RetrievalMethod::Dense], 5),
        request("cat", &["pets"], &[], 5),
        request("cat", &["pets"], &[RetrievalMethod::Dense], 0),
        request("cat", &["pets"], &[RetrievalMethod::Dense], 21),
    ] {
        let err = orch.search(&store, req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sparse_only_search_never_loads_the_model() {
    let store = pets_store().await;
    let (handle, calls) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let resp = orch.search(&store, request("fish", &["pets"], &[RetrievalMethod::Sparse], 3)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(resp.results.len(), 3);
    assert!(resp.results.iter().all(|r| r.retrieval_method == RetrievalMethod::Sparse));
    assert_eq!(resp.results[0].score, 1.0, "normalized by the batch maximum");
    assert!(resp.results[0].chunk.text.contains("fish"));
}

#[tokio::test]
async fn unknown_collections_are_skipped_and_selected_ones_pooled() {
    let store = pets_store().await;
    store.put(&collection("farm", &["The dog herds sheep.", "A cat in the barn."])).await.unwrap();
    store.put(&collection("unused", &["cat cat cat"])).await.unwrap();
    let (handle, calls) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let resp = orch
        .search(&store, request("dog", &["missing", "farm", "pets"], &[RetrievalMethod::Dense], 20))
        .await
        .unwrap();
    assert_eq!(resp.results.len(), PETS.len() + 2);
    assert!(resp.results.iter().all(|r| r.collection_id != "unused"));
    assert!(resp.results.iter().any(|r| r.collection_id == "farm" && r.collection_name == "farm.txt · Sentence Based"));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "query embedded once");
}

#[tokio::test]
async fn equal_scores_keep_pool_order() {
    let store = MemoryStore::new();
    store.put(&collection("one", &["weather"])).await.unwrap();
    store.put(&collection("two", &["weather"])).await.unwrap();
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let resp = orch
        .search(&store, request("weather", &["two", "one"], &[RetrievalMethod::Sparse], 5))
        .await
        .unwrap();
    let ids: Vec<&str> = resp.results.iter().map(|r| r.collection_id.as_str()).collect();
    assert_eq!(ids, vec!["two", "one"]);
}

#[tokio::test]
async fn later_searches_make_earlier_ones_stale() {
    let store = pets_store().await;
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);

    let first = orch.search(&store, request("cat", &["pets"], &[RetrievalMethod::Sparse], 5)).await.unwrap();
    assert!(orch.is_current(first.request_id));
    let second = orch.search(&store, request("dog", &["pets"], &[RetrievalMethod::Sparse], 5)).await.unwrap();
    assert!(second.request_id > first.request_id);
    assert!(!orch.is_current(first.request_id));
    assert!(orch.is_current(second.request_id));
}

struct BrokenStore;

#[async_trait]
impl CollectionStore for BrokenStore {
    async fn put(&self, _: &VectorCollection) -> Result<()> { Err(Error::store("store offline", "disk gone")) }
    async fn get_all(&self) -> Result<Vec<VectorCollection>> { Err(Error::store("store offline", "disk gone")) }
    async fn delete(&self, _: &str) -> Result<()> { Err(Error::store("store offline", "disk gone")) }
    async fn clear(&self) -> Result<()> { Err(Error::store("store offline", "disk gone")) }
}

#[tokio::test]
async fn store_failure_is_an_error_not_an_empty_list() {
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);
    let err = orch.search(&BrokenStore, request("cat", &["pets"], &[RetrievalMethod::Sparse], 5)).await.unwrap_err();
    assert_eq!(err.user_message(), "store offline");
    assert_eq!(err.detail(), Some("disk gone"));
}

#[tokio::test]
async fn dimension_mismatch_fails_fast() {
    let store = MemoryStore::new();
    let mut odd = collection("odd", &["cat"]);
    odd.vectors = vec![vec![1.0, 0.0]];
    store.put(&odd).await.unwrap();
    let (handle, _) = counting_handle();
    let orch = RetrievalOrchestrator::new(handle);
    let err = orch.search(&store, request("cat", &["odd"], &[RetrievalMethod::Dense], 5)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn nan_scores_rank_last_without_disturbing_the_rest() {
    let pool = collection("pool", &["a", "b", "c", "d"]);
    let scored = |i: usize, score: f32| raglab_core::types::SearchResult {
        chunk: pool.chunks[i].clone(),
        score,
        retrieval_method: RetrievalMethod::Dense,
        collection_name: pool.name.clone(),
        collection_id: pool.id.clone(),
    };
    let mut results = vec![scored(0, 0.2), scored(1, f32::NAN), scored(2, 0.9), scored(3, 0.2)];
    rank(&mut results, 3);
    let order: Vec<usize> = results.iter().map(|r| r.chunk.index).collect();
    assert_eq!(order, vec![2, 0, 3]);

    let mut results = vec![scored(1, f32::NAN), scored(0, 0.5)];
    rank(&mut results, 2);
    assert_eq!(results[0].chunk.index, 0);
    assert!(results[1].score.is_nan());
}
