//! Content gateway - access to the headless CMS
//!
//! The [`ContentGateway`] trait is the only way the rest of the crate talks
//! to the CMS. [`PrismicClient`] speaks the Prismic v2 REST API over HTTP;
//! [`FixtureGateway`] answers the same queries from an in-memory document set.

mod client;
mod document;
mod error;
pub(crate) mod fixture;
pub mod query;

use async_trait::async_trait;

pub use client::PrismicClient;
pub use document::{ApiInfo, ApiRef, Document, SearchResponse};
pub use error::{GatewayError, LoadFailure};
pub use fixture::FixtureGateway;
pub use query::{ContentRef, Ordering, Predicate, QueryOptions};

#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// Search documents matching every predicate
    async fn query(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<SearchResponse, GatewayError>;

    /// Fetch the page referenced by a `next_page` cursor
    async fn fetch_page(&self, cursor: &str) -> Result<SearchResponse, GatewayError>;

    /// Fetch a single document by its uid
    async fn get_by_uid(
        &self,
        document_type: &str,
        uid: &str,
        content_ref: &ContentRef,
    ) -> Result<Document, GatewayError> {
        let options = QueryOptions::new()
            .page_size(1)
            .with_ref(content_ref.clone());
        let resp = self
            .query(&[Predicate::uid(document_type, uid)], &options)
            .await?;
        resp.results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(uid.to_string()))
    }
}
