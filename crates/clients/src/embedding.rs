//! Text embedding client: HTTP call to a SiliconFlow-compatible
//! `/embeddings` endpoint, smart chunking with mean-pooling for oversized
//! text, and a deterministic hash-seeded fallback vector. Grounded on
//! `sage_core/memory/vectorizer.py::TextVectorizer`.

use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use regex::Regex;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use sage_domain::config::EmbeddingConfig;
use sage_domain::error::{Error, Result};
use sage_domain::memory::EMBEDDING_DIM;
use sage_resilience::{BreakerCallError, BreakerRegistry, CircuitBreakerConfig, Retryable, RetryPolicy};

pub struct EmbeddingClient {
    http: HttpClient,
    config: EmbeddingConfig,
    breakers: BreakerRegistry,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig, breakers: BreakerRegistry) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::configuration("SILICONFLOW_API_KEY environment variable is not set"));
        }
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("failed to build embedding http client: {e}")))?;
        Ok(Self { http, config, breakers })
    }

    pub fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Embeds `text`, chunking when it exceeds `chunk_size` unless
    /// `enable_chunking` is false, in which case oversized text is still
    /// sent as a single call (the source's behavior for `enable_chunking=False`).
    pub async fn vectorize(&self, text: &str, enable_chunking: bool, chunk_size: usize) -> Result<Vec<f32>> {
        if !enable_chunking || text.chars().count() <= chunk_size {
            return self.vectorize_single(text).await;
        }

        let chunks = smart_chunk_text(text, chunk_size);
        let mut pooled = vec![0f32; EMBEDDING_DIM];
        for chunk in &chunks {
            let v = self.vectorize_single(chunk).await?;
            for (p, x) in pooled.iter_mut().zip(v.iter()) {
                *p += x;
            }
        }
        let n = chunks.len().max(1) as f32;
        for p in pooled.iter_mut() {
            *p /= n;
        }
        Ok(pooled)
    }

    /// One HTTP call, or the deterministic fallback on a request/transport
    /// failure. A dimension mismatch from the remote service is a hard
    /// failure (spec §9 Fallbacks) and is propagated unchanged, never
    /// covered by the fallback.
    async fn vectorize_single(&self, text: &str) -> Result<Vec<f32>> {
        match self.vectorize_remote(text).await {
            Ok(v) => Ok(v),
            Err(e @ Error::EmbeddingService { .. }) if e.to_string().contains("dimension mismatch") => {
                tracing::error!(text_len = text.len(), "embedding dimension mismatch, hard failure");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding service call failed, using hash fallback");
                Ok(hash_fallback(text))
            }
        }
    }

    async fn vectorize_remote(&self, text: &str) -> Result<Vec<f32>> {
        let breaker = self.breakers.get_or_create(
            "embedding_service",
            CircuitBreakerConfig { failure_threshold: 5, recovery_timeout: Duration::from_secs(60), ..Default::default() },
        );
        let mut retry = RetryPolicy::network();

        let text_owned = text.to_string();
        sage_resilience::ResilientCall::run(
            &breaker,
            &mut retry,
            || self.call_embeddings_endpoint(&text_owned),
            |_: &Error| Retryable::Yes,
        )
        .await
        .map_err(|e| match e {
            BreakerCallError::Open(open) => Error::breaker_open(open.0),
            BreakerCallError::Inner(inner) => inner,
        })
    }

    async fn call_embeddings_endpoint(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest { model: &self.config.model, input: text, encoding_format: "float" };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::embedding_service(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::embedding_service(format!("embedding endpoint returned {}", resp.status())));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::embedding_service(format!("invalid embedding response: {e}")))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::embedding_service("embedding response had no data"))?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(Error::embedding_service(format!(
                "dimension mismatch: expected {}, got {}",
                EMBEDDING_DIM,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}

/// Paragraph-then-sentence-then-force-split chunking, grounded on
/// `_smart_chunk_text`/`_split_sentences`.
fn smart_chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").collect();

    if paragraphs.len() == 1 {
        return force_split(text, chunk_size);
    }

    let sentence_re = Regex::new(r"[.!?\u{3002}\u{ff01}\u{ff1f}]+").expect("valid sentence regex");
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in paragraphs {
        if para.chars().count() > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(split_long_paragraph(para, chunk_size, &sentence_re));
            continue;
        }

        if current.chars().count() + para.chars().count() + 2 > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

fn split_long_paragraph(paragraph: &str, chunk_size: usize, sentence_re: &Regex) -> Vec<String> {
    let sentences = split_sentences(paragraph, sentence_re);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        if sentence.chars().count() > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(force_split(&sentence, chunk_size));
            continue;
        }
        if current.chars().count() + sentence.chars().count() > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(&sentence);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_sentences(text: &str, sentence_re: &Regex) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in sentence_re.find_iter(text) {
        let segment = text[last..m.end()].trim();
        if !segment.is_empty() {
            sentences.push(format!("{segment}."));
        }
        last = m.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        sentences.push(format!("{tail}."));
    }
    sentences
}

fn force_split(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![text.to_string()];
    }
    chars.chunks(chunk_size.max(1)).map(|c| c.iter().collect()).collect()
}

/// `|hash(text)| mod 2^32`-seeded standard normal draw, L2-normalized.
/// Deterministic per build, not bit-identical to the Python/NumPy source
/// (see `DESIGN.md` Open Question 2).
fn hash_fallback(text: &str) -> Vec<f32> {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut v: Vec<f32> = (0..EMBEDDING_DIM).map(|_| StandardNormal.sample(&mut rng)).collect();

    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_fallback_is_deterministic_and_unit_length() {
        let a = hash_fallback("hello world");
        let b = hash_fallback("hello world");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[test]
    fn hash_fallback_differs_across_inputs() {
        assert_ne!(hash_fallback("a"), hash_fallback("b"));
    }

    #[test]
    fn force_split_respects_chunk_size() {
        let text = "a".repeat(25);
        let chunks = force_split(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn smart_chunk_preserves_paragraph_boundaries_when_small() {
        let text = "first paragraph\n\nsecond paragraph";
        let chunks = smart_chunk_text(text, 1000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("first paragraph"));
        assert!(chunks[0].contains("second paragraph"));
    }

    #[test]
    fn smart_chunk_splits_oversized_paragraph_by_sentence() {
        let sentence = "word ".repeat(20);
        let text = format!("{sentence}. {sentence}.");
        let chunks = smart_chunk_text(&text, 60);
        assert!(chunks.len() > 1);
    }
}
