//! In-process fakes for the embedding and chat providers.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use csv_rag::config::Config;
use csv_rag::embedding::Embedder;
use csv_rag::pipeline::Rag;
use csv_rag::respond::{ChatProvider, CompletionError, CompletionRequest, Responder};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEMO_CSV: &str =
    "Customer,ARR,Region,ChurnRisk\nAcme,120000,West,Low\nGlobex,45000,East,High\n";

const DIMS: usize = 256;

/// Deterministic bag-of-words embedder: each lowercase alphanumeric token
/// adds weight to an FNV-1a hashed bucket.
#[derive(Default)]
pub struct WordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl WordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn embed_one(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in token.bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        "nomic-embed-text"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// Records every prompt and answers with fixed text, optionally after a delay.
pub struct RecordingChat {
    pub prompts: Mutex<Vec<String>>,
    pub reply: String,
    pub delay: Duration,
}

impl RecordingChat {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            reply: reply.to_string(),
            delay: Duration::ZERO,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            reply: "too late".to_string(),
            delay,
        })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatProvider for RecordingChat {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("  {}  ", self.reply))
    }
}

pub fn test_config(index_dir: &Path) -> Config {
    let mut config = Config::default();
    config.index.dir = index_dir.to_path_buf();
    config
}

pub fn rag_with(
    index_dir: &Path,
    embedder: Arc<WordEmbedder>,
    chat: Arc<RecordingChat>,
    timeout: Duration,
) -> Rag {
    let responder = Responder::new(chat, "test-model", 256, timeout);
    Rag::new(test_config(index_dir), embedder, responder).unwrap()
}
