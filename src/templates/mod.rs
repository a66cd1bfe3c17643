//! Built-in site templates using Tera template engine
//!
//! Templates and the stylesheet are embedded directly in the binary, so a
//! site directory only needs a `_config.yml`.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera};

use crate::config::SiteConfig;
use crate::content::{parse_timestamp, rich_text, NavPost, PostDetail, PostSummary};
use crate::helpers::{post_path, strip_html, url_for, DateFormatter};

const STYLESHEET: &str = include_str!("site/style.css");

/// Template renderer with the embedded site theme
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates loaded
    pub fn new(config: &SiteConfig) -> Result<Self> {
        let mut tera = Tera::default();

        // CMS text is untrusted; rendered rich text is marked safe explicitly
        tera.autoescape_on(vec![".html"]);

        tera.add_raw_templates(vec![
            ("layout.html", include_str!("site/layout.html")),
            ("index.html", include_str!("site/index.html")),
            ("post.html", include_str!("site/post.html")),
            ("not_found.html", include_str!("site/not_found.html")),
            ("error.html", include_str!("site/error.html")),
            (
                "partials/header.html",
                include_str!("site/partials/header.html"),
            ),
        ])?;

        tera.register_filter("strip_html", strip_html_filter);
        tera.register_filter("truncate_chars", truncate_chars_filter);
        tera.register_filter("date_format", date_format_filter(DateFormatter::from_config(config)));

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }

    /// The site stylesheet
    pub fn stylesheet(&self) -> &'static str {
        STYLESHEET
    }
}

/// Tera filter: strip HTML tags
fn strip_html_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("strip_html", "value", String, value);
    Ok(tera::Value::String(strip_html(&s)))
}

/// Tera filter: truncate by character count
fn truncate_chars_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("truncate_chars", "value", String, value);
    let length = match args.get("length") {
        Some(val) => tera::try_get_value!("truncate_chars", "length", usize, val),
        None => 150,
    };
    let omission = match args.get("omission") {
        Some(val) => tera::try_get_value!("truncate_chars", "omission", String, val),
        None => "...".to_string(),
    };
    Ok(tera::Value::String(crate::helpers::truncate(
        &s,
        length,
        Some(&omission),
    )))
}

/// Tera filter: format a timestamp with the site locale.
/// `format` takes date-fns style tokens and defaults to the site's `date_format`.
fn date_format_filter(
    formatter: DateFormatter,
) -> impl Fn(&tera::Value, &HashMap<String, tera::Value>) -> tera::Result<tera::Value> + Send + Sync
{
    move |value, args| {
        let s = tera::try_get_value!("date_format", "value", String, value);
        let Some(date) = parse_timestamp(&s) else {
            return Ok(tera::Value::String(s));
        };
        let formatted = match args.get("format") {
            Some(val) => {
                let pattern = tera::try_get_value!("date_format", "format", String, val);
                formatter.format_with(&date, &pattern)
            }
            None => formatter.format(&date),
        };
        Ok(tera::Value::String(formatted))
    }
}

/// Data structures for template context

#[derive(Debug, Clone, Serialize)]
pub struct ConfigData {
    pub title: String,
    pub description: String,
    pub url: String,
    pub root: String,
    /// BCP 47 language tag for `<html lang>`
    pub lang: String,
    pub stylesheet: String,
}

impl ConfigData {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            title: config.title.clone(),
            description: config.description.clone(),
            url: config.url.clone(),
            root: url_for(config, ""),
            lang: config.language.replace('_', "-"),
            stylesheet: url_for(config, "style.css"),
        }
    }
}

/// A listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostCard {
    pub uid: String,
    pub path: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    /// First publication date, already formatted
    pub date: Option<String>,
}

impl PostCard {
    pub fn new(post: &PostSummary, config: &SiteConfig, formatter: &DateFormatter) -> Self {
        Self {
            uid: post.uid.clone(),
            path: post_path(config, &post.uid),
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            author: post.author.clone(),
            date: post.first_publication_date.map(|d| formatter.format(&d)),
        }
    }
}

/// The listing page state handed to `index.html`
#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub posts: Vec<PostCard>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Server route that resolves cursors; `None` fetches cursors directly
    pub endpoint: Option<String>,
    /// Path prefix of post pages, used by the page script
    pub post_root: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub heading: Option<String>,
    pub html: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub uid: String,
    pub path: String,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    pub banner_url: Option<String>,
    pub banner_alt: String,
    pub first_publication_date: Option<String>,
    pub last_publication_date: Option<String>,
    pub edited: bool,
    pub reading_minutes: u32,
    pub sections: Vec<SectionView>,
}

impl PostView {
    pub fn new(post: &PostDetail, config: &SiteConfig) -> Self {
        Self {
            uid: post.uid.clone(),
            path: post_path(config, &post.uid),
            title: post.title.clone(),
            subtitle: post.subtitle.clone(),
            author: post.author.clone(),
            banner_url: post.banner.url.clone().filter(|u| !u.is_empty()),
            banner_alt: post
                .banner
                .alt
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| post.title.clone()),
            first_publication_date: post.first_publication_date.map(|d| d.to_rfc3339()),
            last_publication_date: post.last_publication_date.map(|d| d.to_rfc3339()),
            edited: post.was_edited(),
            reading_minutes: post.reading_minutes(config.reading.words_per_minute),
            sections: post
                .content
                .iter()
                .map(|section| SectionView {
                    heading: section.heading.clone(),
                    html: rich_text::as_html(&section.body),
                })
                .collect(),
        }
    }
}

/// A link to a neighboring post
#[derive(Debug, Clone, Serialize)]
pub struct NavLink {
    pub title: String,
    pub path: String,
}

impl NavLink {
    pub fn new(post: &NavPost, config: &SiteConfig) -> Self {
        Self {
            title: post.title.clone(),
            path: post_path(config, &post.uid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Banner, ContentSection, RichTextBlock};
    use chrono::{TimeZone, Utc};

    fn summary(uid: &str) -> PostSummary {
        PostSummary {
            uid: uid.to_string(),
            first_publication_date: Some(Utc.with_ymd_and_hms(2021, 3, 15, 19, 25, 0).unwrap()),
            title: "Como utilizar Hooks".to_string(),
            subtitle: "Pensando em sincronização".to_string(),
            author: "Joseph Oliveira".to_string(),
        }
    }

    fn detail() -> PostDetail {
        PostDetail {
            id: "doc-1".to_string(),
            uid: "como-utilizar-hooks".to_string(),
            first_publication_date: Some(Utc.with_ymd_and_hms(2021, 3, 15, 19, 25, 0).unwrap()),
            last_publication_date: Some(Utc.with_ymd_and_hms(2021, 3, 19, 19, 25, 0).unwrap()),
            title: "Como utilizar Hooks".to_string(),
            subtitle: String::new(),
            banner: Banner {
                url: Some("https://images.prismic.io/hooks.png".to_string()),
                alt: None,
            },
            author: "Joseph Oliveira".to_string(),
            content: vec![ContentSection {
                heading: Some("Proin et varius".to_string()),
                body: vec![RichTextBlock::paragraph("Lorem <ipsum> dolor")],
            }],
        }
    }

    fn listing(config: &SiteConfig, next_cursor: Option<&str>) -> ListingView {
        let formatter = DateFormatter::from_config(config);
        ListingView {
            posts: vec![PostCard::new(&summary("a"), config, &formatter)],
            next_cursor: next_cursor.map(str::to_string),
            has_more: next_cursor.is_some(),
            endpoint: None,
            post_root: url_for(config, "post/"),
        }
    }

    fn context(config: &SiteConfig) -> Context {
        let mut context = Context::new();
        context.insert("config", &ConfigData::from_config(config));
        context
    }

    #[test]
    fn test_post_card_formats_date() {
        let config = SiteConfig::default();
        let card = PostCard::new(&summary("hooks"), &config, &DateFormatter::from_config(&config));
        assert_eq!(card.path, "/post/hooks/");
        assert_eq!(card.date.as_deref(), Some("15 mar 2021"));
    }

    #[test]
    fn test_render_index_with_more() {
        let config = SiteConfig::default();
        let renderer = TemplateRenderer::new(&config).unwrap();
        let mut ctx = context(&config);
        ctx.insert("listing", &listing(&config, Some("https://cms/next?page=2")));
        let html = renderer.render("index.html", &ctx).unwrap();
        assert!(html.contains("Como utilizar Hooks"));
        assert!(html.contains("15 mar 2021"));
        assert!(html.contains("Carregar mais posts"));
        assert!(html.contains(r#"lang="pt-BR""#));
    }

    #[test]
    fn test_render_index_without_more() {
        let config = SiteConfig::default();
        let renderer = TemplateRenderer::new(&config).unwrap();
        let mut ctx = context(&config);
        ctx.insert("listing", &listing(&config, None));
        let html = renderer.render("index.html", &ctx).unwrap();
        assert!(!html.contains("Carregar mais posts"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_render_post() {
        let config = SiteConfig::default();
        let renderer = TemplateRenderer::new(&config).unwrap();
        let post = detail();
        let mut ctx = context(&config);
        ctx.insert("post", &PostView::new(&post, &config));
        ctx.insert("open_graph", "");
        ctx.insert("preview", &false);
        ctx.insert(
            "next",
            &Some(NavLink::new(
                &NavPost {
                    title: "Criando um app CRA do zero".to_string(),
                    uid: "criando-um-app-cra-do-zero".to_string(),
                },
                &config,
            )),
        );
        ctx.insert("prev", &None::<NavLink>);
        let html = renderer.render("post.html", &ctx).unwrap();

        assert!(html.contains("<h1>Como utilizar Hooks</h1>"));
        assert!(html.contains("1 min"));
        assert!(html.contains("15 mar 2021"));
        assert!(html.contains("* editado em 19 mar 2021, às 19:25"));
        assert!(html.contains("<p>Lorem &lt;ipsum&gt; dolor</p>"));
        assert!(html.contains(r#"alt="Como utilizar Hooks""#));
        assert!(html.contains("criando-um-app-cra-do-zero"));
        assert!(!html.contains("Post anterior"));
    }

    #[test]
    fn test_render_not_found() {
        let config = SiteConfig::default();
        let renderer = TemplateRenderer::new(&config).unwrap();
        let mut ctx = context(&config);
        ctx.insert("uid", "missing<post>");
        let html = renderer.render("not_found.html", &ctx).unwrap();
        assert!(html.contains("404"));
        assert!(html.contains("missing&lt;post&gt;"));
    }

    #[test]
    fn test_date_format_filter() {
        let filter = date_format_filter(DateFormatter::new("dd MMM yyyy", "pt_BR", ""));
        let value = tera::Value::String("2021-03-25T19:25:28+0000".to_string());
        let out = filter(&value, &HashMap::new()).unwrap();
        assert_eq!(out, tera::Value::String("25 mar 2021".to_string()));

        let mut args = HashMap::new();
        args.insert("format".to_string(), tera::Value::String("yyyy".to_string()));
        assert_eq!(
            filter(&value, &args).unwrap(),
            tera::Value::String("2021".to_string())
        );

        let garbage = tera::Value::String("soon".to_string());
        assert_eq!(filter(&garbage, &HashMap::new()).unwrap(), garbage);
    }

    #[test]
    fn test_truncate_and_strip_filters() {
        let value = tera::Value::String("<p>Hello <b>World</b></p>".to_string());
        let stripped = strip_html_filter(&value, &HashMap::new()).unwrap();
        assert_eq!(stripped, tera::Value::String("Hello World".to_string()));

        let mut args = HashMap::new();
        args.insert("length".to_string(), tera::Value::from(8));
        let truncated = truncate_chars_filter(&stripped, &args).unwrap();
        assert_eq!(truncated, tera::Value::String("Hello...".to_string()));
    }
}
