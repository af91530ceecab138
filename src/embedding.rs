//! Embedding generation abstraction and the self-bootstrapping default
//! implementation (§4.4, §4.4.2).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Embedding, Embeddings};

/// Embedding generation abstraction so callers can supply their own model.
/// `embed_query` defaults to `embed_documents` over a single-element slice;
/// implementations that can do query-side prompting cheaper than a full
/// document batch should override it.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings>;

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let mut result = self.embed_documents(std::slice::from_ref(&text.to_string())).await?;
        result.pop().ok_or_else(|| {
            crate::error::ChromiumError::client("embedder returned no embedding for query text")
        })
    }

    fn dimension(&self) -> usize;

    /// Release any resources this embedder holds. A no-op by default, since
    /// most embedders (hosted adapters making plain HTTP calls) own nothing
    /// that needs releasing; the default on-device embedder overrides this
    /// to decrement the process-wide runtime reference count.
    fn close(&self) {}
}

/// Convenience impl so `Box<dyn EmbeddingFunction>` can itself be used as an
/// `EmbeddingFunction`.
#[async_trait]
impl EmbeddingFunction for Box<dyn EmbeddingFunction> {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
        (**self).embed_documents(docs).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        (**self).embed_query(text).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn close(&self) {
        (**self).close()
    }
}

#[cfg(feature = "embedding")]
mod default_embedding {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::EmbeddingFunction;
    use crate::assets::{self, AssetManagerConfig};
    use crate::error::{ChromiumError, Result};
    use crate::runtime::RuntimeHandle;
    use crate::types::{Embedding, Embeddings};

    const MAX_LENGTH: usize = 256;
    const EMBEDDING_DIM: usize = 384;
    const DEFAULT_RUNTIME_VERSION: &str = "latest";
    const DEFAULT_MODEL_VERSION: &str = "latest";
    const DEFAULT_GITHUB_REPO: &str = "ob-labs/chromium-rs-assets";
    const DEFAULT_PRIMARY_MIRROR: &str = "https://assets.trychroma.com/embedding/";
    const DEFAULT_FALLBACK_MIRROR: &str = "https://github.com/ob-labs/chromium-rs-assets/releases/download/";
    const DEFAULT_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";
    const DEFAULT_IDENTITY_TEMPLATE: &str =
        "https://github.com/{repo}/.github/workflows/release.yml@refs/tags/{tag}";

    /// The default on-device embedder: `all-MiniLM-L6-v2` run through ONNX
    /// Runtime, self-bootstrapped via the native asset manager on first use.
    pub struct DefaultEmbedding {
        tokenizer: tokenizers::Tokenizer,
        session: Mutex<ort::session::Session>,
        runtime: RuntimeHandle,
        closed: AtomicBool,
    }

    impl DefaultEmbedding {
        /// Resolve (downloading and verifying if necessary) the runtime
        /// library and model bundle, then build a ready-to-use embedder.
        /// Requires `CHROMIUM_ASSET_TRUST_ROOT` to point at a PEM file
        /// containing the vendor's code-signing root certificate; this
        /// crate does not ship a pinned root since that would require
        /// in-tree rotation as the vendor's signing key changes.
        pub async fn new() -> Result<Self> {
            let config = build_asset_manager_config()?;

            let runtime_lib = assets::prepare_runtime_library(
                &config,
                std::env::var("CHROMIUM_ONNXRUNTIME_VERSION").ok(),
                DEFAULT_RUNTIME_VERSION,
            )
            .await?;
            let model_bundle = assets::prepare_model_bundle(
                &config,
                std::env::var("CHROMIUM_EMBEDDING_MODEL_VERSION").ok(),
                DEFAULT_MODEL_VERSION,
            )
            .await?;

            let runtime = RuntimeHandle::acquire_with_library(&runtime_lib.path)?;

            let tokenizer_path = model_bundle.path.join("tokenizer.json");
            let model_path = model_bundle.path.join("model.onnx");
            let mut tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
                ChromiumError::client(format!(
                    "failed to load tokenizer from {}: {e}",
                    tokenizer_path.display()
                ))
            })?;
            configure_tokenizer(&mut tokenizer)?;

            let session = ort::session::Session::builder()
                .map_err(|e| ChromiumError::client(format!("failed to create session builder: {e}")))?
                .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level1)
                .map_err(|e| ChromiumError::client(format!("failed to set optimization level: {e}")))?
                .commit_from_file(&model_path)
                .map_err(|e| {
                    ChromiumError::client(format!(
                        "failed to load onnx model from {}: {e}",
                        model_path.display()
                    ))
                })?;

            Ok(Self {
                tokenizer,
                session: Mutex::new(session),
                runtime,
                closed: AtomicBool::new(false),
            })
        }

        fn check_open(&self) -> Result<()> {
            if self.closed.load(Ordering::SeqCst) {
                Err(ChromiumError::client("embedder has been closed"))
            } else {
                Ok(())
            }
        }
    }

    fn configure_tokenizer(tokenizer: &mut tokenizers::Tokenizer) -> Result<()> {
        let mut truncation = tokenizer.get_truncation().cloned().unwrap_or_default();
        truncation.max_length = MAX_LENGTH;
        tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| ChromiumError::client(format!("failed to set truncation: {e}")))?;

        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        padding.strategy = tokenizers::utils::padding::PaddingStrategy::Fixed(MAX_LENGTH);
        tokenizer.with_padding(Some(padding));
        Ok(())
    }

    fn build_asset_manager_config() -> Result<AssetManagerConfig> {
        let root_cert_path = std::env::var("CHROMIUM_ASSET_TRUST_ROOT").map_err(|_| {
            ChromiumError::client(
                "CHROMIUM_ASSET_TRUST_ROOT must name a PEM file containing the asset signing root certificate",
            )
        })?;
        let root_cert_pem = std::fs::read(&root_cert_path).map_err(|e| {
            ChromiumError::client(format!("failed to read CHROMIUM_ASSET_TRUST_ROOT ({root_cert_path}): {e}"))
        })?;

        Ok(AssetManagerConfig {
            primary_mirror: std::env::var("CHROMIUM_ASSET_PRIMARY_MIRROR")
                .unwrap_or_else(|_| DEFAULT_PRIMARY_MIRROR.to_string()),
            fallback_mirror: std::env::var("CHROMIUM_ASSET_FALLBACK_MIRROR")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_MIRROR.to_string()),
            github_repo: std::env::var("CHROMIUM_ASSET_GITHUB_REPO")
                .unwrap_or_else(|_| DEFAULT_GITHUB_REPO.to_string()),
            expected_oidc_issuer: std::env::var("CHROMIUM_ASSET_OIDC_ISSUER")
                .unwrap_or_else(|_| DEFAULT_OIDC_ISSUER.to_string()),
            identity_template: std::env::var("CHROMIUM_ASSET_IDENTITY_TEMPLATE")
                .unwrap_or_else(|_| DEFAULT_IDENTITY_TEMPLATE.to_string()),
            signature_verifier: std::sync::Arc::new(crate::assets::verify::DefaultSignatureVerifier::new(
                root_cert_pem,
            )),
            http_client: reqwest::Client::new(),
            github_token: std::env::var("GITHUB_TOKEN").ok(),
        })
    }

    #[async_trait]
    impl EmbeddingFunction for DefaultEmbedding {
        async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
            self.check_open()?;
            if docs.is_empty() {
                return Ok(Vec::new());
            }
            run_inference(&self.session, &self.tokenizer, docs)
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }

        /// Release the held runtime reference synchronously, ahead of
        /// `Drop`, so the process-wide reference count drops as soon as a
        /// caller asks rather than whenever the struct happens to go out of
        /// scope (§4.4.3). Any further embedding call returns a client
        /// error. Idempotent: `RuntimeHandle::release` is itself guarded by
        /// a single-shot flag.
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            let _ = self.runtime.release();
        }
    }

    fn run_inference(
        session: &Mutex<ort::session::Session>,
        tokenizer: &tokenizers::Tokenizer,
        docs: &[String],
    ) -> Result<Embeddings> {
        let encodings = tokenizer
            .encode_batch(docs.to_vec(), true)
            .map_err(|e| ChromiumError::client(format!("tokenization failed: {e}")))?;

        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
        if seq_len == 0 {
            return Err(ChromiumError::client("tokenization produced an empty sequence"));
        }

        let batch = encodings.len();
        let mut input_ids: Vec<i64> = Vec::with_capacity(batch * seq_len);
        let mut attention_mask: Vec<i64> = Vec::with_capacity(batch * seq_len);
        let mut token_type_ids: Vec<i64> = Vec::with_capacity(batch * seq_len);
        for enc in &encodings {
            if enc.get_ids().len() != seq_len || enc.get_attention_mask().len() != seq_len {
                return Err(ChromiumError::client(
                    "tokenization produced inconsistent sequence lengths within a batch",
                ));
            }
            input_ids.extend(enc.get_ids().iter().map(|id| *id as i64));
            attention_mask.extend(enc.get_attention_mask().iter().map(|m| *m as i64));
            token_type_ids.extend(std::iter::repeat(0_i64).take(seq_len));
        }

        let shape: Vec<i64> = vec![batch as i64, seq_len as i64];
        let input_ids_tensor = ort::value::Tensor::<i64>::from_array((shape.clone(), input_ids))
            .map_err(|e| ChromiumError::client(format!("failed to build input_ids tensor: {e}")))?;
        let attention_tensor = ort::value::Tensor::<i64>::from_array((shape.clone(), attention_mask.clone()))
            .map_err(|e| ChromiumError::client(format!("failed to build attention_mask tensor: {e}")))?;
        let token_type_tensor = ort::value::Tensor::<i64>::from_array((shape, token_type_ids))
            .map_err(|e| ChromiumError::client(format!("failed to build token_type_ids tensor: {e}")))?;

        let mut session = session
            .lock()
            .map_err(|_| ChromiumError::client("onnx session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_tensor,
                "token_type_ids" => token_type_tensor
            ])
            .map_err(|e| ChromiumError::client(format!("onnx inference failed: {e}")))?;

        let output = outputs
            .get(0)
            .ok_or_else(|| ChromiumError::client("onnx model returned no outputs"))?;
        let (out_shape, out_data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ChromiumError::client(format!("failed to extract output tensor: {e}")))?;

        if out_shape.len() != 3 {
            return Err(ChromiumError::client(format!("unexpected output rank: {out_shape:?}")));
        }
        let out_batch = out_shape[0] as usize;
        let out_seq_len = out_shape[1] as usize;
        let hidden = out_shape[2] as usize;
        if out_batch != batch || out_seq_len != seq_len || hidden != EMBEDDING_DIM {
            return Err(ChromiumError::client(format!(
                "unexpected output dims (got {out_batch}x{out_seq_len}x{hidden}, expected {batch}x{seq_len}x{EMBEDDING_DIM})"
            )));
        }

        let pooled = mean_pool(out_data, &attention_mask, batch, seq_len, hidden)?;
        Ok(pooled
            .into_iter()
            .map(|v| Embedding::Float32(l2_normalize(v)))
            .collect())
    }

    fn mean_pool(
        data: &[f32],
        attention_mask: &[i64],
        batch: usize,
        seq_len: usize,
        hidden: usize,
    ) -> Result<Vec<Vec<f32>>> {
        if attention_mask.len() != batch * seq_len {
            return Err(ChromiumError::client(
                "attention mask length does not match batch and sequence length",
            ));
        }
        if data.len() != batch * seq_len * hidden {
            return Err(ChromiumError::client(
                "model output size does not match expected dimensions",
            ));
        }

        let mut outputs = Vec::with_capacity(batch);
        for b in 0..batch {
            let mut vec = vec![0f32; hidden];
            let mut count = 0f32;
            for t in 0..seq_len {
                if attention_mask[b * seq_len + t] == 0 {
                    continue;
                }
                count += 1.0;
                let offset = (b * seq_len + t) * hidden;
                for h in 0..hidden {
                    vec[h] += data[offset + h];
                }
            }
            if count == 0.0 {
                count = 1.0;
            }
            for v in vec.iter_mut() {
                *v /= count;
            }
            outputs.push(vec);
        }
        Ok(outputs)
    }

    fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }

}

#[cfg(feature = "embedding")]
pub use default_embedding::DefaultEmbedding;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingFunction for StubEmbedder {
        async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
            Ok(docs
                .iter()
                .map(|d| Embedding::Float32(vec![d.len() as f32, 1.0]))
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn embed_query_defaults_to_single_element_batch() {
        let stub = StubEmbedder;
        let embedding = stub.embed_query("hello").await.unwrap();
        assert_eq!(embedding.as_f32(), vec![5.0, 1.0]);
    }

    #[tokio::test]
    async fn boxed_embedding_function_delegates() {
        let boxed: Box<dyn EmbeddingFunction> = Box::new(StubEmbedder);
        let embeddings = boxed.embed_documents(&["ab".to_string()]).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(boxed.dimension(), 2);
    }
}
