//! In-memory gateway backed by a JSON dump of documents
//!
//! Evaluates the subset of the query language the site uses: `at`
//! predicates, orderings, `after` positioning, field projection and
//! paging with `next_page` cursors.

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use super::{
    document::{Document, SearchResponse},
    error::GatewayError,
    query::{Direction, Ordering, Predicate, QueryOptions, DOCUMENT_TYPE},
    ContentGateway,
};

const CURSOR_SCHEME: &str = "fixture";
const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
struct StoredQuery {
    predicates: Vec<Predicate>,
    options: QueryOptions,
}

#[derive(Debug, Default)]
pub struct FixtureGateway {
    documents: Vec<Document>,
    queries: Mutex<Vec<StoredQuery>>,
    requests: AtomicUsize,
}

impl FixtureGateway {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    /// Load documents from a JSON file holding an array of documents
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let documents: Vec<Document> = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded {} fixture documents from {:?}",
            documents.len(),
            path.as_ref()
        );
        Ok(Self::new(documents))
    }

    /// Number of requests served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(AtomicOrdering::SeqCst)
    }

    /// Id of `query`, reusing the id of an identical earlier query
    fn remember(&self, query: StoredQuery) -> usize {
        let mut queries = self.queries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = queries.iter().position(|q| q == &query) {
            return id;
        }
        queries.push(query);
        queries.len() - 1
    }

    fn stored(&self, id: usize) -> Option<StoredQuery> {
        let queries = self.queries.lock().unwrap_or_else(|e| e.into_inner());
        queries.get(id).cloned()
    }

    fn search(&self, query_id: usize, query: &StoredQuery, page: usize) -> SearchResponse {
        let mut matched: Vec<&Document> = self
            .documents
            .iter()
            .filter(|d| query.predicates.iter().all(|p| matches(d, p)))
            .collect();

        for ordering in query.options.orderings.iter().rev() {
            matched.sort_by(|a, b| compare(a, b, ordering));
        }

        if let Some(ref after) = query.options.after {
            matched = match matched.iter().position(|d| &d.id == after) {
                Some(pos) => matched.split_off(pos + 1),
                None => Vec::new(),
            };
        }

        let page_size = query.options.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
        let total = matched.len();
        let total_pages = total.div_ceil(page_size);
        // Pages past the end come back empty
        let start = (page - 1).saturating_mul(page_size);
        let results: Vec<Document> = matched
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|d| project(d, &query.options.fetch))
            .collect();

        let cursor = |p: usize| format!("{}://search/{}?page={}", CURSOR_SCHEME, query_id, p);
        SearchResponse {
            page: u32::try_from(page).unwrap_or(u32::MAX),
            results_per_page: page_size as u32,
            results_size: results.len() as u32,
            total_results_size: total as u32,
            total_pages: total_pages as u32,
            next_page: (page < total_pages).then(|| cursor(page + 1)),
            prev_page: (page > 1).then(|| cursor(page - 1)),
            results,
        }
    }

    fn parse_cursor(cursor: &str) -> Option<(usize, usize)> {
        let url = reqwest::Url::parse(cursor).ok()?;
        if url.scheme() != CURSOR_SCHEME {
            return None;
        }
        let query_id = url.path().trim_start_matches('/').parse().ok()?;
        let page = url
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .filter(|p| *p >= 1)?;
        Some((query_id, page))
    }
}

fn matches(document: &Document, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::At { path, value } => match path.as_str() {
            DOCUMENT_TYPE => &document.document_type == value,
            "document.id" => &document.id == value,
            _ => {
                let Some(rest) = path.strip_prefix("my.") else {
                    return false;
                };
                let Some((doc_type, field)) = rest.split_once('.') else {
                    return false;
                };
                if document.document_type != doc_type {
                    return false;
                }
                if field == "uid" {
                    document.uid.as_deref() == Some(value.as_str())
                } else {
                    document.data.get(field).and_then(|v| v.as_str()) == Some(value.as_str())
                }
            }
        },
    }
}

fn sort_key(document: &Document, field: &str) -> Option<String> {
    match field {
        "document.first_publication_date" => document.first_publication_date.clone(),
        "document.last_publication_date" => document.last_publication_date.clone(),
        "document.id" => Some(document.id.clone()),
        _ => field
            .strip_prefix("my.")
            .and_then(|rest| rest.split_once('.'))
            .and_then(|(_, f)| document.data.get(f))
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

fn compare(a: &Document, b: &Document, ordering: &Ordering) -> CmpOrdering {
    let cmp = sort_key(a, &ordering.field).cmp(&sort_key(b, &ordering.field));
    match ordering.direction {
        Direction::Asc => cmp,
        Direction::Desc => cmp.reverse(),
    }
}

/// Keep only the projected `type.field` entries of `data`
fn project(document: &Document, fetch: &[String]) -> Document {
    let mut document = document.clone();
    if fetch.is_empty() {
        return document;
    }
    if let serde_json::Value::Object(ref mut data) = document.data {
        let doc_type = document.document_type.clone();
        data.retain(|field, _| {
            fetch
                .iter()
                .any(|f| f.split_once('.') == Some((doc_type.as_str(), field.as_str())))
        });
    }
    document
}

#[async_trait]
impl ContentGateway for FixtureGateway {
    async fn query(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<SearchResponse, GatewayError> {
        self.requests.fetch_add(1, AtomicOrdering::SeqCst);
        if options.content_ref.is_preview() {
            tracing::debug!("Fixture gateway has no drafts, serving published content");
        }
        let query = StoredQuery {
            predicates: predicates.to_vec(),
            options: options.clone(),
        };
        let query_id = self.remember(query.clone());
        Ok(self.search(query_id, &query, 1))
    }

    async fn fetch_page(&self, cursor: &str) -> Result<SearchResponse, GatewayError> {
        if cursor.trim().is_empty() {
            return Err(GatewayError::ExhaustedCursor);
        }
        self.requests.fetch_add(1, AtomicOrdering::SeqCst);
        let (query_id, page) = Self::parse_cursor(cursor)
            .ok_or_else(|| GatewayError::InvalidCursor(cursor.to_string()))?;
        let query = self
            .stored(query_id)
            .ok_or_else(|| GatewayError::Status(404))?;
        Ok(self.search(query_id, &query, page))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::query::FIRST_PUBLICATION_DATE;
    use serde_json::json;

    /// A `posts` document published on day `day` of March 2021
    pub(crate) fn post_document(n: usize, day: u32) -> Document {
        Document {
            id: format!("doc-{}", n),
            uid: Some(format!("post-{}", n)),
            document_type: "posts".to_string(),
            first_publication_date: Some(format!("2021-03-{:02}T12:00:00+0000", day)),
            last_publication_date: Some(format!("2021-03-{:02}T18:00:00+0000", day)),
            data: json!({
                "title": format!("Post {}", n),
                "subtitle": format!("Subtitle {}", n),
                "author": "Joseph Oliveira",
                "banner": {"url": format!("https://images.prismic.io/post-{}.png", n)},
                "content": [{
                    "heading": "Intro",
                    "body": [{"type": "paragraph", "text": "Lorem ipsum dolor", "spans": []}]
                }]
            }),
        }
    }

    pub(crate) fn posts(n: usize) -> Vec<Document> {
        (1..=n).map(|i| post_document(i, i as u32)).collect()
    }

    #[tokio::test]
    async fn test_query_pages_with_cursor() {
        let gateway = FixtureGateway::new(posts(5));
        let options = QueryOptions::new().page_size(2);
        let first = gateway
            .query(&[Predicate::document_type("posts")], &options)
            .await
            .unwrap();
        assert_eq!(first.results.len(), 2);
        assert_eq!(first.total_pages, 3);
        let cursor = first.next_cursor().unwrap();

        let second = gateway.fetch_page(&cursor).await.unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(second.results[0].id, "doc-3");

        let third = gateway.fetch_page(&second.next_cursor().unwrap()).await.unwrap();
        assert_eq!(third.results.len(), 1);
        assert_eq!(third.next_cursor(), None);
        assert_eq!(gateway.request_count(), 3);
    }

    #[tokio::test]
    async fn test_ordering_and_after() {
        let mut docs = posts(4);
        docs.reverse();
        let gateway = FixtureGateway::new(docs);

        let options = QueryOptions::new()
            .page_size(1)
            .order_by(Ordering::desc(FIRST_PUBLICATION_DATE))
            .after("doc-3");
        let resp = gateway
            .query(&[Predicate::document_type("posts")], &options)
            .await
            .unwrap();
        assert_eq!(resp.results[0].id, "doc-2");

        let options = QueryOptions::new()
            .page_size(1)
            .order_by(Ordering::asc(FIRST_PUBLICATION_DATE))
            .after("doc-4");
        let resp = gateway
            .query(&[Predicate::document_type("posts")], &options)
            .await
            .unwrap();
        assert!(resp.results.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_uid_and_projection() {
        let gateway = FixtureGateway::new(posts(3));
        let doc = gateway
            .get_by_uid("posts", "post-2", &Default::default())
            .await
            .unwrap();
        assert_eq!(doc.id, "doc-2");

        let err = gateway
            .get_by_uid("posts", "missing", &Default::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let options = QueryOptions::new().fetch(["posts.title"]);
        let resp = gateway
            .query(&[Predicate::document_type("posts")], &options)
            .await
            .unwrap();
        let data = resp.results[0].data.as_object().unwrap();
        assert_eq!(data.len(), 1);
        assert!(data.contains_key("title"));
    }

    #[tokio::test]
    async fn test_bad_cursor() {
        let gateway = FixtureGateway::new(posts(1));
        let err = gateway.fetch_page("https://example.com/x").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCursor(_)));
        let err = gateway.fetch_page("").await.unwrap_err();
        assert!(matches!(err, GatewayError::ExhaustedCursor));
    }

    #[tokio::test]
    async fn test_page_far_past_the_end_is_empty() {
        let gateway = FixtureGateway::new(posts(3));
        let options = QueryOptions::new().page_size(2);
        gateway
            .query(&[Predicate::document_type("posts")], &options)
            .await
            .unwrap();

        let cursor = format!("fixture://search/0?page={}", usize::MAX);
        let resp = gateway.fetch_page(&cursor).await.unwrap();
        assert!(resp.results.is_empty());
        assert_eq!(resp.next_cursor(), None);
        assert_eq!(resp.page, u32::MAX);
    }

    #[tokio::test]
    async fn test_repeated_queries_share_a_cursor() {
        let gateway = FixtureGateway::new(posts(5));
        let predicates = [Predicate::document_type("posts")];
        let options = QueryOptions::new().page_size(2);

        let first = gateway.query(&predicates, &options).await.unwrap();
        let second = gateway.query(&predicates, &options).await.unwrap();
        assert_eq!(first.next_cursor(), second.next_cursor());

        let other = gateway
            .query(&predicates, &QueryOptions::new().page_size(3))
            .await
            .unwrap();
        assert_ne!(first.next_cursor(), other.next_cursor());
        assert_eq!(gateway.queries.lock().unwrap().len(), 2);
        assert_eq!(gateway.request_count(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.json");
        std::fs::write(&path, serde_json::to_string(&posts(2)).unwrap()).unwrap();
        let gateway = FixtureGateway::load(&path).unwrap();
        assert_eq!(gateway.documents.len(), 2);
    }
}
