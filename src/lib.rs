//! Rust client for a remote HTTP/JSON vector database: session and
//! collection lifecycle, a predicate algebra for metadata/document filters,
//! and a self-bootstrapping local embedding pipeline.

#[cfg(feature = "embedding")]
pub mod assets;
pub mod client;
pub mod collection;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filters;
pub mod http;
pub mod ids;
pub mod recordset;
pub mod runtime;
pub mod session;
#[cfg(feature = "sync")]
pub mod sync;
pub mod types;

pub use crate::client::Client;
pub use crate::collection::{Collection, GetParams, QueryParams};
pub use crate::config::{ClientConfig, ClientConfigBuilder, DistanceSpace};
pub use crate::embedding::EmbeddingFunction;
pub use crate::error::ChromiumError;
pub use crate::filters::{
    and, contains, doc_and, doc_or, eq, gt, gte, in_, lt, lte, ne, nin, not_contains, or,
    parse_where, parse_where_document, serialize_where, serialize_where_document, DocFilter,
    Filter, WhereBuilder, WhereDocumentBuilder,
};
pub use crate::http::{BasicAuth, BearerToken, CredentialsProvider, VendorToken};
pub use crate::ids::{ContentHashId, IdGenerator, LexicographicId, RandomId};
pub use crate::recordset::RecordSet;
pub use crate::session::Session;
pub use crate::types::{
    Database, Document, Documents, Embedding, Embeddings, GetResult, IncludeField, Metadata,
    PreflightChecks, QueryResult, Record, Scalar, Tenant,
};

#[cfg(feature = "embedding")]
pub use crate::embedding::DefaultEmbedding;

#[cfg(feature = "sync")]
pub use crate::sync::{SyncClient, SyncCollection};
