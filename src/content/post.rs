//! Post models mapped from CMS documents

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fields::{optional_text_field, text_field};
use super::reading_time::estimate_reading_minutes;
use super::rich_text::RichTextBlock;
use crate::gateway::{Document, GatewayError};

/// A post as shown in the listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub uid: String,
    pub first_publication_date: Option<DateTime<Utc>>,
    pub title: String,
    pub subtitle: String,
    pub author: String,
}

/// A full post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    /// CMS document id, used to position neighbor queries
    pub id: String,
    pub uid: String,
    pub first_publication_date: Option<DateTime<Utc>>,
    pub last_publication_date: Option<DateTime<Utc>>,
    pub title: String,
    pub subtitle: String,
    pub banner: Banner,
    pub author: String,
    pub content: Vec<ContentSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Banner {
    pub url: Option<String>,
    pub alt: Option<String>,
}

/// One section of a post body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    #[serde(deserialize_with = "optional_text_field", default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub body: Vec<RichTextBlock>,
}

/// A link to a neighboring post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavPost {
    pub title: String,
    pub uid: String,
}

/// The custom fields of a `posts` document
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostFields {
    #[serde(deserialize_with = "text_field")]
    title: String,
    #[serde(deserialize_with = "text_field")]
    subtitle: String,
    #[serde(deserialize_with = "text_field")]
    author: String,
    banner: Banner,
    content: Vec<ContentSection>,
}

impl PostFields {
    fn from_document(document: &Document) -> Result<Self, GatewayError> {
        if document.data.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(document.data.clone()).map_err(|e| {
            GatewayError::MalformedResponse(format!("document {}: {}", document.id, e))
        })
    }
}

fn require_uid(document: &Document) -> Result<String, GatewayError> {
    document
        .uid
        .clone()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GatewayError::MalformedResponse(format!("document {} has no uid", document.id)))
}

impl TryFrom<&Document> for PostSummary {
    type Error = GatewayError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let fields = PostFields::from_document(document)?;
        Ok(Self {
            uid: require_uid(document)?,
            first_publication_date: document
                .first_publication_date
                .as_deref()
                .and_then(parse_timestamp),
            title: fields.title,
            subtitle: fields.subtitle,
            author: fields.author,
        })
    }
}

impl TryFrom<&Document> for PostDetail {
    type Error = GatewayError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let fields = PostFields::from_document(document)?;
        Ok(Self {
            id: document.id.clone(),
            uid: require_uid(document)?,
            first_publication_date: document
                .first_publication_date
                .as_deref()
                .and_then(parse_timestamp),
            last_publication_date: document
                .last_publication_date
                .as_deref()
                .and_then(parse_timestamp),
            title: fields.title,
            subtitle: fields.subtitle,
            banner: fields.banner,
            author: fields.author,
            content: fields.content,
        })
    }
}

impl TryFrom<&Document> for NavPost {
    type Error = GatewayError;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        let fields = PostFields::from_document(document)?;
        Ok(Self {
            title: fields.title,
            uid: require_uid(document)?,
        })
    }
}

impl PostDetail {
    pub fn reading_minutes(&self, words_per_minute: usize) -> u32 {
        estimate_reading_minutes(&self.content, words_per_minute)
    }

    /// Whether the post was republished after its first publication
    pub fn was_edited(&self) -> bool {
        match (self.first_publication_date, self.last_publication_date) {
            (Some(first), Some(last)) => last > first,
            _ => false,
        }
    }
}

/// Parse a CMS timestamp such as `2021-03-25T19:25:28+0000`
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"];
    for fmt in formats {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Naive timestamps are taken as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}
