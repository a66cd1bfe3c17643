use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::{
    document::{ApiInfo, SearchResponse},
    error::GatewayError,
    query::{ContentRef, Predicate, QueryOptions},
    ContentGateway,
};
use crate::config::CmsConfig;

#[derive(Debug, Clone)]
struct CachedRef {
    reference: String,
    fetched_at: Instant,
}

/// A client for the Prismic v2 REST API.
///
/// Every search needs a content ref. The master ref is read from the API
/// root and kept for `MASTER_REF_TTL`, so a publish in the CMS shows up
/// within that window.
#[derive(Debug)]
pub struct PrismicClient {
    http: reqwest::Client,
    endpoint: Url,
    access_token: Option<String>,
    max_retries: usize,
    master_ref: RwLock<Option<CachedRef>>,
}

impl PrismicClient {
    const MASTER_REF_TTL: Duration = Duration::from_secs(60);
    const BACKOFF_STEP_MS: u64 = 500;
    const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

    pub fn new(cfg: &CmsConfig) -> Result<Self, GatewayError> {
        if cfg.endpoint.trim().is_empty() {
            return Err(GatewayError::Config(
                "cms.endpoint is not set".to_string(),
            ));
        }
        let endpoint = Url::parse(cfg.endpoint.trim_end_matches('/'))
            .map_err(|e| GatewayError::Config(format!("invalid cms.endpoint: {}", e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(GatewayError::Config(format!(
                "invalid cms.endpoint: {}",
                endpoint
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .user_agent(concat!("spacetraveling/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            access_token: cfg.access_token.clone().filter(|t| !t.is_empty()),
            max_retries: cfg.max_retries,
            master_ref: RwLock::new(None),
        })
    }

    /// Build the search URL for a query against `content_ref`
    pub fn search_url(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
        content_ref: &str,
    ) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(["documents", "search"]);
        }
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("ref", content_ref);
            for (key, value) in options.params(predicates) {
                pairs.append_pair(key, &value);
            }
            if let Some(ref token) = self.access_token {
                pairs.append_pair("access_token", token);
            }
        }
        url
    }

    /// Parse a `next_page` cursor, accepting only URLs under the endpoint
    fn cursor_url(&self, cursor: &str) -> Result<Url, GatewayError> {
        let url = Url::parse(cursor)
            .map_err(|e| GatewayError::InvalidCursor(format!("{}: {}", cursor, e)))?;
        let base = self.endpoint.path().trim_end_matches('/');
        let same_origin = url.scheme() == self.endpoint.scheme()
            && url.host_str() == self.endpoint.host_str()
            && url.port_or_known_default() == self.endpoint.port_or_known_default();
        let under_base = url
            .path()
            .strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if !(same_origin && under_base) {
            warn!("Refusing cursor outside the content API: {}", url);
            return Err(GatewayError::InvalidCursor(cursor.to_string()));
        }
        Ok(url)
    }

    fn root_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(ref token) = self.access_token {
            url.query_pairs_mut().append_pair("access_token", token);
        }
        url
    }

    async fn master_ref(&self) -> Result<String, GatewayError> {
        if let Some(cached) = self.master_ref.read().await.as_ref() {
            if cached.fetched_at.elapsed() < Self::MASTER_REF_TTL {
                return Ok(cached.reference.clone());
            }
        }

        let info: ApiInfo = self.get_json(self.root_url()).await?;
        let reference = info
            .master_ref()
            .ok_or_else(|| GatewayError::MalformedResponse("no master ref".to_string()))?
            .to_string();
        debug!("Master ref: {}", reference);
        *self.master_ref.write().await = Some(CachedRef {
            reference: reference.clone(),
            fetched_at: Instant::now(),
        });
        Ok(reference)
    }

    async fn resolve_ref(&self, content_ref: &ContentRef) -> Result<String, GatewayError> {
        match content_ref {
            ContentRef::Master => self.master_ref().await,
            ContentRef::Preview(reference) => Ok(reference.clone()),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        let mut retries: usize = 0;
        loop {
            match self.get_once(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    let delay = Self::retry_delay(&e, retries);
                    warn!(
                        "Error getting {}: {}, retrying {} more times",
                        url.path(),
                        e,
                        self.max_retries - retries
                    );
                    retries += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `Retry-After` when the API sent one, capped, else linear backoff
    fn retry_delay(err: &GatewayError, retries: usize) -> Duration {
        match err {
            GatewayError::RateLimited {
                retry_after: Some(secs),
            } => Duration::from_secs(*secs).min(Self::MAX_RETRY_AFTER),
            _ => Duration::from_millis(Self::BACKOFF_STEP_MS * (retries as u64 + 1)),
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, GatewayError> {
        debug!("Sending request to {}", url.path());
        let resp = self.http.get(url.clone()).send().await?;
        Self::handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        match resp.status() {
            StatusCode::OK => {
                let body = resp.bytes().await?;
                Ok(serde_json::from_slice(&body)?)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());
                warn!("request {} rate limited", resp.url().path());
                Err(GatewayError::RateLimited { retry_after })
            }
            status => {
                error!("request {} status: {}", resp.url().path(), status);
                Err(GatewayError::Status(status.as_u16()))
            }
        }
    }
}

#[async_trait]
impl ContentGateway for PrismicClient {
    async fn query(
        &self,
        predicates: &[Predicate],
        options: &QueryOptions,
    ) -> Result<SearchResponse, GatewayError> {
        let content_ref = self.resolve_ref(&options.content_ref).await?;
        let url = self.search_url(predicates, options, &content_ref);
        self.get_json(url).await
    }

    async fn fetch_page(&self, cursor: &str) -> Result<SearchResponse, GatewayError> {
        if cursor.trim().is_empty() {
            return Err(GatewayError::ExhaustedCursor);
        }
        let url = self.cursor_url(cursor)?;
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::query::{Ordering, FIRST_PUBLICATION_DATE};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A local HTTP server answering one canned response per connection
    struct StubServer {
        port: u16,
        hits: Arc<AtomicUsize>,
    }

    impl StubServer {
        /// Serve `responses` in order, repeating the last one
        async fn start(responses: Vec<String>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let n = counter.fetch_add(1, AtomicOrdering::SeqCst);
                    let response = responses[n.min(responses.len() - 1)].clone();
                    tokio::spawn(async move {
                        let mut request = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => request.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
            });
            Self { port, hits }
        }

        fn hits(&self) -> usize {
            self.hits.load(AtomicOrdering::SeqCst)
        }

        fn url(&self, path: &str) -> String {
            format!("http://127.0.0.1:{}{}", self.port, path)
        }
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    fn ok(body: &str) -> String {
        http_response("200 OK", "", body)
    }

    fn local_client(server: &StubServer, max_retries: usize) -> PrismicClient {
        PrismicClient {
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            endpoint: Url::parse(&server.url("/api/v2")).unwrap(),
            access_token: None,
            max_retries,
            master_ref: RwLock::new(None),
        }
    }

    fn client(token: Option<&str>) -> PrismicClient {
        let cfg = CmsConfig {
            endpoint: "https://spacetraveling.cdn.prismic.io/api/v2/".to_string(),
            access_token: token.map(str::to_string),
            ..Default::default()
        };
        PrismicClient::new(&cfg).unwrap()
    }

    #[test]
    fn test_missing_endpoint() {
        let err = PrismicClient::new(&CmsConfig::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_invalid_endpoint() {
        let cfg = CmsConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            PrismicClient::new(&cfg),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_search_url() {
        let client = client(Some("secret"));
        let options = QueryOptions::new()
            .fetch(["posts.title"])
            .page_size(1)
            .order_by(Ordering::asc(FIRST_PUBLICATION_DATE))
            .after("doc-1");
        let url = client.search_url(&[Predicate::document_type("posts")], &options, "master-ref");

        assert_eq!(url.path(), "/api/v2/documents/search");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("ref".to_string(), "master-ref".to_string()));
        assert_eq!(
            pairs[1],
            ("q".to_string(), r#"[[at(document.type,"posts")]]"#.to_string())
        );
        assert!(pairs.contains(&("after".to_string(), "doc-1".to_string())));
        assert!(pairs.contains(&(
            "orderings".to_string(),
            "[document.first_publication_date]".to_string()
        )));
        assert_eq!(
            pairs.last().unwrap(),
            &("access_token".to_string(), "secret".to_string())
        );
    }

    #[test]
    fn test_root_url_without_token() {
        let client = client(None);
        assert_eq!(
            client.root_url().as_str(),
            "https://spacetraveling.cdn.prismic.io/api/v2"
        );
    }

    #[tokio::test]
    async fn test_preview_ref_skips_api_root() {
        let client = client(None);
        let reference = client
            .resolve_ref(&ContentRef::Preview("preview-ref".to_string()))
            .await
            .unwrap();
        assert_eq!(reference, "preview-ref");
    }

    #[tokio::test]
    async fn test_empty_cursor_is_exhausted() {
        let client = client(None);
        let err = client.fetch_page("").await.unwrap_err();
        assert!(matches!(err, GatewayError::ExhaustedCursor));
    }

    #[tokio::test]
    async fn test_foreign_cursor_is_refused() {
        let server = StubServer::start(vec![ok(r#"{"results": []}"#)]).await;

        let remote = client(None);
        let err = remote
            .fetch_page(&server.url("/latest/meta-data/iam"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCursor(_)));

        let local = local_client(&server, 0);
        for path in ["/latest/meta-data/iam", "/api/v2-admin/search", "/api"] {
            let err = local.fetch_page(&server.url(path)).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidCursor(_)), "{}", path);
        }
        let err = local.fetch_page("not a url").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCursor(_)));
        assert_eq!(server.hits(), 0);
    }

    #[tokio::test]
    async fn test_cursor_under_endpoint_is_fetched() {
        let server = StubServer::start(vec![ok(
            r#"{"page": 2, "results": [], "next_page": null}"#,
        )])
        .await;
        let client = local_client(&server, 0);

        let resp = client
            .fetch_page(&server.url("/api/v2/documents/search?ref=abc&page=2"))
            .await
            .unwrap();
        assert_eq!(resp.page, 2);
        assert_eq!(resp.next_cursor(), None);
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_up_to_max() {
        let server = StubServer::start(vec![http_response(
            "429 Too Many Requests",
            "Retry-After: 0\r\n",
            "{}",
        )])
        .await;
        let client = local_client(&server, 2);

        let err = client
            .fetch_page(&server.url("/api/v2/documents/search?page=2"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RateLimited {
                retry_after: Some(0)
            }
        ));
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = StubServer::start(vec![
            http_response("429 Too Many Requests", "Retry-After: 0\r\n", "{}"),
            ok(r#"{"page": 2, "results": []}"#),
        ])
        .await;
        let client = local_client(&server, 2);

        let resp = client
            .fetch_page(&server.url("/api/v2/documents/search?page=2"))
            .await
            .unwrap();
        assert_eq!(resp.page, 2);
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let server = StubServer::start(vec![ok("<html>maintenance</html>")]).await;
        let client = local_client(&server, 2);

        let err = client
            .fetch_page(&server.url("/api/v2/documents/search?page=2"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_other_status_is_not_retried() {
        let server = StubServer::start(vec![http_response(
            "500 Internal Server Error",
            "",
            "{}",
        )])
        .await;
        let client = local_client(&server, 2);

        let err = client
            .fetch_page(&server.url("/api/v2/documents/search?page=2"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status(500)));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_master_ref_is_cached() {
        let server = StubServer::start(vec![
            ok(r#"{"refs": [{"id": "master", "ref": "abc", "isMasterRef": true}]}"#),
            ok(r#"{"page": 1, "results": []}"#),
        ])
        .await;
        let client = local_client(&server, 0);
        let predicates = [Predicate::document_type("posts")];

        client.query(&predicates, &QueryOptions::new()).await.unwrap();
        client.query(&predicates, &QueryOptions::new()).await.unwrap();
        assert_eq!(server.hits(), 3);
    }

    #[test]
    fn test_retry_delay() {
        let limited = |secs| GatewayError::RateLimited {
            retry_after: Some(secs),
        };
        assert_eq!(
            PrismicClient::retry_delay(&limited(3), 0),
            Duration::from_secs(3)
        );
        assert_eq!(
            PrismicClient::retry_delay(&limited(86_400), 0),
            PrismicClient::MAX_RETRY_AFTER
        );
        let no_header = GatewayError::RateLimited { retry_after: None };
        assert_eq!(
            PrismicClient::retry_delay(&no_header, 1),
            Duration::from_millis(1000)
        );
    }
}
