//! Previous/next post resolution

use serde::Serialize;
use tracing::{debug, warn};

use crate::content::{NavPost, PostDetail};
use crate::gateway::query::FIRST_PUBLICATION_DATE;
use crate::gateway::{
    ContentGateway, ContentRef, GatewayError, Ordering, Predicate, QueryOptions, SearchResponse,
};

/// The posts published immediately before and after a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Adjacent {
    pub prev: Option<NavPost>,
    pub next: Option<NavPost>,
}

/// Find the chronological neighbors of `current`.
///
/// The previous post is the first result after `current` when ordering by
/// first publication date descending, the next post the same with ascending
/// order. Both queries run concurrently. A failed query yields no neighbor.
pub async fn find_adjacent(
    gateway: &dyn ContentGateway,
    current: &PostDetail,
    document_type: &str,
    content_ref: &ContentRef,
) -> Adjacent {
    let prev_query = neighbor_options(document_type, &current.id, content_ref, false);
    let next_query = neighbor_options(document_type, &current.id, content_ref, true);
    let predicates = [Predicate::document_type(document_type)];

    let (prev, next) = tokio::join!(
        gateway.query(&predicates, &prev_query),
        gateway.query(&predicates, &next_query),
    );

    let adjacent = Adjacent {
        prev: neighbor("previous", prev, &current.uid),
        next: neighbor("next", next, &current.uid),
    };
    debug!(
        "Neighbors of {}: prev={:?} next={:?}",
        current.uid,
        adjacent.prev.as_ref().map(|p| &p.uid),
        adjacent.next.as_ref().map(|p| &p.uid)
    );
    adjacent
}

fn neighbor_options(
    document_type: &str,
    document_id: &str,
    content_ref: &ContentRef,
    ascending: bool,
) -> QueryOptions {
    let ordering = if ascending {
        Ordering::asc(FIRST_PUBLICATION_DATE)
    } else {
        Ordering::desc(FIRST_PUBLICATION_DATE)
    };
    QueryOptions::new()
        .fetch([format!("{}.title", document_type)])
        .page_size(1)
        .order_by(ordering)
        .after(document_id)
        .with_ref(content_ref.clone())
}

fn neighbor(
    which: &str,
    result: Result<SearchResponse, GatewayError>,
    current_uid: &str,
) -> Option<NavPost> {
    let resp = match result {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Failed to load {} post of {}: {}", which, current_uid, e);
            return None;
        }
    };
    let document = resp.results.first()?;
    match NavPost::try_from(document) {
        Ok(nav) if nav.uid == current_uid => None,
        Ok(nav) => Some(nav),
        Err(e) => {
            warn!("Ignoring {} post of {}: {}", which, current_uid, e);
            None
        }
    }
}
