//! Staging buffer for record ingestion. Records are appended in any order
//! determined by the caller; [`RecordSet::build_and_validate`] fills in
//! anything missing (identifiers, embeddings) and checks the invariants the
//! server expects before a submission is ever attempted.

use std::collections::HashSet;
use std::sync::Arc;

use crate::embedding::EmbeddingFunction;
use crate::error::{ChromiumError, Result};
use crate::filters::validate_scalar;
use crate::ids::IdGenerator;
use crate::types::Record;

/// Ordered sequence of records plus a bound identifier generator.
pub struct RecordSet {
    records: Vec<Record>,
    id_generator: Arc<dyn IdGenerator>,
}

impl RecordSet {
    pub fn new(id_generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            records: Vec::new(),
            id_generator,
        }
    }

    pub fn push(&mut self, record: Record) -> &mut Self {
        self.records.push(record);
        self
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) -> &mut Self {
        self.records.extend(records);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fill missing identifiers from the bound generator and missing
    /// embeddings from `embedder`, then check completeness: every record
    /// must end up with a non-empty id and an embedding, and ids must be
    /// unique within the set.
    pub async fn build_and_validate(
        mut self,
        embedder: Option<&dyn EmbeddingFunction>,
    ) -> Result<Vec<Record>> {
        if self.records.is_empty() {
            return Err(ChromiumError::client("record set is empty"));
        }

        for record in &mut self.records {
            if record.id.is_empty() {
                record.id = self.id_generator.generate(record.document.as_deref());
            }
            if record.document.is_none() && record.uri.is_none() && record.embedding.is_none() {
                return Err(ChromiumError::validation(format!(
                    "record {} has none of document, uri, or embedding",
                    record.id
                )));
            }
            if let Some(metadata) = &record.metadata {
                for value in metadata.values() {
                    validate_scalar(value)?;
                }
            }
        }

        let missing: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let embedder = embedder.ok_or_else(|| {
                ChromiumError::client(
                    "records are missing embeddings and no embedder is bound to this record set",
                )
            })?;
            let docs: Vec<String> = missing
                .iter()
                .map(|&i| {
                    self.records[i].document.clone().ok_or_else(|| {
                        ChromiumError::validation(format!(
                            "record {} has no embedding and no document to embed",
                            self.records[i].id
                        ))
                    })
                })
                .collect::<Result<_>>()?;

            let generated = embedder.embed_documents(&docs).await?;
            if generated.len() != missing.len() {
                return Err(ChromiumError::client(format!(
                    "embedder returned {} embeddings for {} documents",
                    generated.len(),
                    missing.len()
                )));
            }
            for (idx, embedding) in missing.into_iter().zip(generated) {
                self.records[idx].embedding = Some(embedding);
            }
        }

        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            let embedding_len = record
                .embedding
                .as_ref()
                .map(|e| e.len())
                .unwrap_or(0);
            if embedding_len == 0 {
                return Err(ChromiumError::client(format!(
                    "record {} has an empty embedding after build",
                    record.id
                )));
            }
            if !seen.insert(record.id.clone()) {
                return Err(ChromiumError::client(format!(
                    "duplicate id in record set: {}",
                    record.id
                )));
            }
        }

        Ok(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ContentHashId;
    use crate::types::Embedding;
    use async_trait::async_trait;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingFunction for StubEmbedder {
        async fn embed_documents(&self, docs: &[String]) -> Result<Vec<Embedding>> {
            Ok(docs.iter().map(|_| Embedding::Float32(vec![0.1, 0.2])).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn fills_missing_ids_and_embeddings() {
        let mut set = RecordSet::new(Arc::new(ContentHashId));
        set.push(Record::new("").with_document("hello"));
        set.push(Record::new("").with_document("world"));

        let built = set.build_and_validate(Some(&StubEmbedder)).await.unwrap();
        assert_eq!(built.len(), 2);
        for record in &built {
            assert!(!record.id.is_empty());
            assert!(record.embedding.is_some());
        }
    }

    #[tokio::test]
    async fn rejects_missing_embedder() {
        let mut set = RecordSet::new(Arc::new(ContentHashId));
        set.push(Record::new("id-1").with_document("hello"));
        let err = set.build_and_validate(None).await.unwrap_err();
        assert!(matches!(err, ChromiumError::Client(_)));
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let mut set = RecordSet::new(Arc::new(ContentHashId));
        set.push(Record::new("dup").with_embedding(vec![0.1_f32]));
        set.push(Record::new("dup").with_embedding(vec![0.2_f32]));
        let err = set.build_and_validate(None).await.unwrap_err();
        assert!(matches!(err, ChromiumError::Client(_)));
    }

    #[tokio::test]
    async fn rejects_record_with_no_content() {
        let mut set = RecordSet::new(Arc::new(ContentHashId));
        set.push(Record::new("bare"));
        let err = set.build_and_validate(None).await.unwrap_err();
        assert!(matches!(err, ChromiumError::ValidationFailure(_)));
    }
}
