//! Shared fixtures: deterministic fake embedding providers and text builders.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kb_search::embedding::EmbeddingProvider;
use kb_search::error::{KbError, Result};

/// Deterministic content-sensitive provider: hashes character trigrams into
/// a fixed number of buckets and normalizes. Similar texts get similar
/// vectors, so end-to-end ranking behaves plausibly without any network.
pub struct HashProvider {
    pub dims: usize,
    pub calls: AtomicUsize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dims.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        for window in chars.windows(3) {
            let token: String = window.iter().collect();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }
        let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut vector {
                *v /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "fake-trigram"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_input_chars(&self) -> usize {
        8191
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Returns the same fixed vector for every input. Lets tests pin the query
/// vector exactly while chunk vectors are written straight into the store.
pub struct StubProvider {
    pub vector: Vec<f32>,
    pub calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn model_name(&self) -> &str {
        "fake-stub"
    }
    fn dims(&self) -> usize {
        self.vector.len()
    }
    fn max_input_chars(&self) -> usize {
        8191
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Fails every call, simulating a provider outage.
pub struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    fn model_name(&self) -> &str {
        "fake-outage"
    }
    fn dims(&self) -> usize {
        4
    }
    fn max_input_chars(&self) -> usize {
        8191
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(KbError::Provider("simulated provider outage".to_string()))
    }
}

/// Builds `len` bytes of distinct numbered sentences.
pub fn sentence_text(len: usize) -> String {
    let mut out = String::new();
    let mut i = 0;
    while out.len() < len {
        out.push_str(&format!(
            "Sentence number {:05} of this synthetic corpus ends here. ",
            i
        ));
        i += 1;
    }
    out.truncate(len);
    out
}
