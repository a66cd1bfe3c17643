//! Cursor-based "load more" pagination for the post listing

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::CmsConfig;
use crate::content::PostSummary;
use crate::gateway::{
    ContentGateway, GatewayError, LoadFailure, Predicate, QueryOptions, SearchResponse,
};

/// One page of post summaries and the cursor to the next
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostSummary>,
    pub next_cursor: Option<String>,
}

impl TryFrom<&SearchResponse> for PostPage {
    type Error = GatewayError;

    fn try_from(resp: &SearchResponse) -> Result<Self, Self::Error> {
        let posts = resp
            .results
            .iter()
            .map(PostSummary::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            posts,
            next_cursor: resp.next_cursor(),
        })
    }
}

/// Fields projected for listing entries
pub fn listing_fields(document_type: &str) -> Vec<String> {
    ["title", "subtitle", "author"]
        .iter()
        .map(|f| format!("{}.{}", document_type, f))
        .collect()
}

/// Fetch the first page of the listing, in the gateway's default order
pub async fn load_initial_page(
    gateway: &dyn ContentGateway,
    cms: &CmsConfig,
) -> Result<PostPage, GatewayError> {
    let options = QueryOptions::new()
        .fetch(listing_fields(&cms.document_type))
        .page_size(cms.page_size);
    let resp = gateway
        .query(&[Predicate::document_type(&cms.document_type)], &options)
        .await?;
    let page = PostPage::try_from(&resp)?;
    debug!(
        "Loaded initial page: {} posts, more: {}",
        page.posts.len(),
        page.next_cursor.is_some()
    );
    Ok(page)
}

/// Fetch the page behind `cursor`
pub async fn load_more(
    gateway: &dyn ContentGateway,
    cursor: &str,
) -> Result<PostPage, GatewayError> {
    if cursor.trim().is_empty() {
        return Err(GatewayError::ExhaustedCursor);
    }
    let resp = gateway.fetch_page(cursor).await?;
    PostPage::try_from(&resp)
}

/// Outcome of asking the listing for more posts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMoreOutcome {
    /// `count` new posts were appended
    Appended { count: usize },
    /// The cursor is exhausted; nothing was fetched
    Exhausted,
    /// Another fetch is still running; nothing was fetched
    InFlight,
    /// The fetch failed; posts and cursor are unchanged
    Failed(LoadFailure),
}

/// The listing's view model.
///
/// Only [`ListingState::apply`] changes the post list or the cursor, and only
/// one fetch may be outstanding at a time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListingState {
    posts: Vec<PostSummary>,
    next_cursor: Option<String>,
    #[serde(skip)]
    in_flight: bool,
    last_error: Option<LoadFailure>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl ListingState {
    pub fn from_page(page: PostPage) -> Self {
        let mut state = Self::default();
        state.append(page);
        state
    }

    pub fn posts(&self) -> &[PostSummary] {
        &self.posts
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn last_error(&self) -> Option<LoadFailure> {
        self.last_error
    }

    /// Whether the "load more" control should be shown
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Claim the next fetch. Returns the cursor to fetch, or `None` when the
    /// listing is exhausted or a fetch is already running.
    pub fn begin_load(&mut self) -> Option<String> {
        if self.in_flight {
            return None;
        }
        let cursor = self.next_cursor.clone()?;
        self.in_flight = true;
        Some(cursor)
    }

    /// Complete the outstanding fetch with its result
    pub fn apply(&mut self, result: Result<PostPage, GatewayError>) -> LoadMoreOutcome {
        self.in_flight = false;
        match result {
            Ok(page) => {
                self.last_error = None;
                let count = self.append(page);
                LoadMoreOutcome::Appended { count }
            }
            Err(e) => {
                warn!("Failed to load more posts: {}", e);
                let failure = e.load_failure();
                self.last_error = Some(failure);
                LoadMoreOutcome::Failed(failure)
            }
        }
    }

    /// Fetch and apply the next page
    pub async fn load_more(&mut self, gateway: &dyn ContentGateway) -> LoadMoreOutcome {
        if self.in_flight {
            return LoadMoreOutcome::InFlight;
        }
        let Some(cursor) = self.begin_load() else {
            return LoadMoreOutcome::Exhausted;
        };
        let result = load_more(gateway, &cursor).await;
        self.apply(result)
    }

    fn append(&mut self, page: PostPage) -> usize {
        let before = self.posts.len();
        for post in page.posts {
            if self.seen.insert(post.uid.clone()) {
                self.posts.push(post);
            } else {
                debug!("Skipping duplicate post {}", post.uid);
            }
        }
        self.next_cursor = page.next_cursor.filter(|c| !c.trim().is_empty());
        self.posts.len() - before
    }
}
