//! List site content

use anyhow::Result;

use crate::config::CmsConfig;
use crate::content::PostSummary;
use crate::gateway::ContentGateway;
use crate::pagination::{load_initial_page, ListingState, LoadMoreOutcome};
use crate::Site;

/// Every post of the listing, following cursors to the end
pub async fn collect_posts(
    gateway: &dyn ContentGateway,
    cms: &CmsConfig,
) -> Result<Vec<PostSummary>> {
    let mut state = ListingState::from_page(load_initial_page(gateway, cms).await?);
    loop {
        match state.load_more(gateway).await {
            LoadMoreOutcome::Appended { .. } => continue,
            LoadMoreOutcome::Failed(failure) => anyhow::bail!("{}", failure.message()),
            LoadMoreOutcome::Exhausted | LoadMoreOutcome::InFlight => break,
        }
    }
    Ok(state.posts().to_vec())
}

/// List site content by type
pub async fn run(site: &Site, gateway: &dyn ContentGateway, content_type: &str) -> Result<()> {
    match content_type {
        "post" | "posts" => {
            let posts = collect_posts(gateway, &site.config.cms).await?;
            println!("Posts ({}):", posts.len());
            for post in posts {
                let date = post
                    .first_publication_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "----------".to_string());
                println!("  {} - {} [{}]", date, post.title, post.uid);
            }
        }
        "author" | "authors" => {
            let posts = collect_posts(gateway, &site.config.cms).await?;
            let mut authors: std::collections::HashMap<String, usize> =
                std::collections::HashMap::new();
            for post in &posts {
                *authors.entry(post.author.clone()).or_insert(0) += 1;
            }
            println!("Authors ({}):", authors.len());
            let mut authors: Vec<_> = authors.into_iter().collect();
            authors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (author, count) in authors {
                println!("  {} ({})", author, count);
            }
        }
        _ => {
            anyhow::bail!("Unknown type: {}. Available: post, author", content_type);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fixture::tests::posts;
    use crate::gateway::FixtureGateway;

    #[tokio::test]
    async fn test_collect_walks_every_page() {
        let gateway = FixtureGateway::new(posts(7));
        let cms = CmsConfig {
            page_size: 3,
            ..Default::default()
        };
        let all = collect_posts(&gateway, &cms).await.unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[6].uid, "post-7");
        assert_eq!(gateway.request_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let dir = tempfile::TempDir::new().unwrap();
        let site = Site::new(dir.path()).unwrap();
        let gateway = FixtureGateway::new(posts(1));
        assert!(run(&site, &gateway, "tags").await.is_err());
        assert!(run(&site, &gateway, "post").await.is_ok());
    }
}
