//! Deterministic embedding and chat fakes for tests
//!
//! Compiled for this crate's unit tests and, behind the `test-support`
//! feature, for downstream integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::llm::{ChatModel, Embedder, ModelDescriptor, ModelPair};

/// Returns the same vector for every input
#[derive(Debug, Clone)]
pub struct FixedEmbedder {
    vector: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector.clone())
    }
}

/// Bag-of-concepts embedder: each known word adds weight to its concept axis.
///
/// Unknown words are ignored; a small bias component keeps vectors non-zero.
#[derive(Debug, Clone)]
pub struct ConceptEmbedder {
    axes: HashMap<String, usize>,
    dims: usize,
}

impl ConceptEmbedder {
    /// `lexicon` maps words to concept names; concepts get axes in order of appearance
    pub fn new(lexicon: &[(&str, &str)]) -> Self {
        let mut concepts: Vec<&str> = Vec::new();
        let mut axes = HashMap::new();
        for (word, concept) in lexicon {
            let axis = match concepts.iter().position(|c| c == concept) {
                Some(axis) => axis,
                None => {
                    concepts.push(*concept);
                    concepts.len() - 1
                }
            };
            axes.insert(word.to_lowercase(), axis);
        }
        Self {
            axes,
            dims: concepts.len() + 1,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl Embedder for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        vector[self.dims - 1] = 0.01;
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if let Some(axis) = self.axes.get(&word.to_lowercase()) {
                vector[*axis] += 1.0;
            }
        }
        Ok(vector)
    }
}

/// Fails every call with `EMBED_FAILED`
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingFailed("provider unreachable".to_string()))
    }
}

type Script = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Chat model answering from a closure
#[derive(Clone)]
pub struct ScriptedChat {
    script: Arc<Script>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedChat {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reply with the same text to every prompt
    pub fn always(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Fail every call with the given error factory
    pub fn failing<F>(error: F) -> Self
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        Self::new(move |_| Err(error()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(prompt)
    }
}

/// Bundle fakes into an installable pair
pub fn fake_pair(embedder: Arc<dyn Embedder>, chat: Arc<dyn ChatModel>) -> ModelPair {
    ModelPair {
        embedder,
        chat,
        descriptor: ModelDescriptor {
            provider: "TEST".to_string(),
            chat_model: "fake-chat".to_string(),
            embed_model: "fake-embed".to_string(),
            base_url: None,
        },
    }
}
