//! Generator module - renders pages from CMS content using built-in Tera templates
//!
//! The same render functions back both `generate` (writes `public/`) and the
//! preview server (renders on request).

use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tera::Context;
use walkdir::WalkDir;

use crate::content::{PostDetail, PostSummary};
use crate::gateway::{ContentGateway, ContentRef, GatewayError};
use crate::helpers::{full_url_for, open_graph, url_for, DateFormatter};
use crate::pagination::{
    find_adjacent, load_initial_page, load_more, ListingState, LoadMoreOutcome, PostPage,
};
use crate::templates::{
    ConfigData, ListingView, NavLink, PostCard, PostView, TemplateRenderer,
};
use crate::Site;

/// A rendered post page, or the uid that had no document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostRender {
    Found(String),
    NotFound(String),
}

/// A page of listing entries ready for the page script
#[derive(Debug, Clone, Serialize)]
pub struct CardPage {
    pub posts: Vec<PostCard>,
    pub next_cursor: Option<String>,
}

/// Site generator using Tera templates
pub struct Generator {
    site: Site,
    renderer: TemplateRenderer,
    gateway: Arc<dyn ContentGateway>,
    formatter: DateFormatter,
}

impl Generator {
    /// Create a new generator
    pub fn new(site: &Site, gateway: Arc<dyn ContentGateway>) -> Result<Self> {
        let renderer = TemplateRenderer::new(&site.config)?;
        let formatter = DateFormatter::from_config(&site.config);

        Ok(Self {
            site: site.clone(),
            renderer,
            gateway,
            formatter,
        })
    }

    pub fn stylesheet(&self) -> &'static str {
        self.renderer.stylesheet()
    }

    /// Generate the entire site, returning the number of post pages written
    pub async fn generate(&self) -> Result<usize> {
        let public_dir = &self.site.public_dir;
        fs::create_dir_all(public_dir)?;

        self.copy_static_assets()?;

        let page = load_initial_page(self.gateway.as_ref(), &self.site.config.cms).await?;
        let state = ListingState::from_page(page);

        let html = self.render_listing(&state, None)?;
        fs::write(public_dir.join("index.html"), html)?;
        tracing::debug!("Generated: index.html");

        // Initial listing state, for clients that hydrate without parsing HTML
        fs::write(
            public_dir.join("posts.json"),
            serde_json::to_string_pretty(&state)?,
        )?;

        let uids = self.prerender_uids(state).await?;
        let mut written = 0;
        for uid in &uids {
            if !is_safe_segment(uid) {
                tracing::warn!("Skipping post with unsafe uid {:?}", uid);
                continue;
            }
            match self.render_post(uid, &ContentRef::Master).await? {
                PostRender::Found(html) => {
                    let output_path = public_dir.join("post").join(uid).join("index.html");
                    if let Some(parent) = output_path.parent() {
                        fs::create_dir_all(parent).map_err(|e| {
                            anyhow::anyhow!("Failed to create dir {:?}: {}", parent, e)
                        })?;
                    }
                    fs::write(&output_path, &html)
                        .map_err(|e| anyhow::anyhow!("Failed to write {:?}: {}", output_path, e))?;
                    tracing::debug!("Generated post: {:?}", output_path);
                    written += 1;
                }
                PostRender::NotFound(uid) => {
                    tracing::warn!("Post {} disappeared while generating", uid);
                }
            }
        }

        fs::write(public_dir.join("404.html"), self.render_not_found(None)?)?;
        fs::write(public_dir.join("style.css"), self.stylesheet())?;

        Ok(written)
    }

    /// Uids of the posts to pre-render, walking cursors as far as needed
    async fn prerender_uids(&self, mut state: ListingState) -> Result<Vec<String>> {
        let limit = self.site.config.prerender;
        while state.has_more() && (limit == 0 || state.posts().len() < limit) {
            match state.load_more(self.gateway.as_ref()).await {
                LoadMoreOutcome::Failed(failure) => {
                    anyhow::bail!("Failed to walk the post listing: {}", failure.message());
                }
                LoadMoreOutcome::Appended { count } => {
                    tracing::debug!("Listing walk appended {} posts", count)
                }
                LoadMoreOutcome::Exhausted | LoadMoreOutcome::InFlight => break,
            }
        }

        let uids = state.posts().iter().map(|p| p.uid.clone());
        Ok(if limit == 0 {
            uids.collect()
        } else {
            uids.take(limit).collect()
        })
    }

    /// Create a base context with common variables
    fn base_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("config", &ConfigData::from_config(&self.site.config));
        context
    }

    fn cards(&self, posts: &[PostSummary]) -> Vec<PostCard> {
        posts
            .iter()
            .map(|p| PostCard::new(p, &self.site.config, &self.formatter))
            .collect()
    }

    /// Render the listing page. `endpoint` is the server route resolving
    /// cursors; without it the page script fetches cursors directly.
    pub fn render_listing(&self, state: &ListingState, endpoint: Option<&str>) -> Result<String> {
        let listing = ListingView {
            posts: self.cards(state.posts()),
            next_cursor: state.next_cursor().map(str::to_string),
            has_more: state.has_more(),
            endpoint: endpoint.map(str::to_string),
            post_root: url_for(&self.site.config, "post/"),
        };

        let mut context = self.base_context();
        context.insert("listing", &listing);
        self.renderer.render("index.html", &context)
    }

    /// Load the first page and render the listing
    pub async fn render_index(&self, endpoint: Option<&str>) -> Result<String> {
        let page = load_initial_page(self.gateway.as_ref(), &self.site.config.cms).await?;
        self.render_listing(&ListingState::from_page(page), endpoint)
    }

    /// Resolve a cursor into listing entries
    pub async fn load_cards(&self, cursor: &str) -> Result<CardPage, GatewayError> {
        let PostPage { posts, next_cursor } = load_more(self.gateway.as_ref(), cursor).await?;
        Ok(CardPage {
            posts: self.cards(&posts),
            next_cursor,
        })
    }

    /// Render a post page with its neighbors
    pub async fn render_post(&self, uid: &str, content_ref: &ContentRef) -> Result<PostRender> {
        let cms = &self.site.config.cms;
        let document = match self
            .gateway
            .get_by_uid(&cms.document_type, uid, content_ref)
            .await
        {
            Ok(document) => document,
            Err(e) if e.is_not_found() => {
                tracing::info!("Post not found: {}", uid);
                return Ok(PostRender::NotFound(uid.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let post = PostDetail::try_from(&document)?;
        let adjacent =
            find_adjacent(self.gateway.as_ref(), &post, &cms.document_type, content_ref).await;

        let config = &self.site.config;
        let view = PostView::new(&post, config);
        let og = open_graph(
            &post.title,
            &post.subtitle,
            &full_url_for(config, &format!("post/{}/", post.uid)),
            view.banner_url.as_deref(),
            &config.title,
        );

        let mut context = self.base_context();
        context.insert("post", &view);
        context.insert("open_graph", &og);
        context.insert("preview", &content_ref.is_preview());
        context.insert("prev", &adjacent.prev.as_ref().map(|p| NavLink::new(p, config)));
        context.insert("next", &adjacent.next.as_ref().map(|p| NavLink::new(p, config)));

        Ok(PostRender::Found(self.renderer.render("post.html", &context)?))
    }

    /// Render the not-found page, naming the missing uid when known
    pub fn render_not_found(&self, uid: Option<&str>) -> Result<String> {
        let mut context = self.base_context();
        context.insert("uid", &uid);
        self.renderer.render("not_found.html", &context)
    }

    /// Render a short error page
    pub fn render_error(&self, status: u16, message: &str) -> Result<String> {
        let mut context = self.base_context();
        context.insert("status", &status);
        context.insert("message", message);
        self.renderer.render("error.html", &context)
    }

    /// Copy static assets (images, etc.) to public directory
    fn copy_static_assets(&self) -> Result<()> {
        let static_dir = &self.site.static_dir;
        if !static_dir.is_dir() {
            return Ok(());
        }

        for entry in WalkDir::new(static_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(static_dir)?;
            let dest = self.site.public_dir.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, &dest)?;
        }

        Ok(())
    }
}

/// Whether a uid can be used as a single path segment
fn is_safe_segment(uid: &str) -> bool {
    !uid.is_empty() && uid != "." && uid != ".." && !uid.contains(['/', '\\'])
        && !Path::new(uid).is_absolute()
}
