//! Query building for the document search endpoint

use std::fmt::{self, Display, Formatter};

/// Field holding a document's first publication timestamp
pub const FIRST_PUBLICATION_DATE: &str = "document.first_publication_date";

/// Field holding a document's type
pub const DOCUMENT_TYPE: &str = "document.type";

/// A search predicate, evaluated by the CMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `at(path, "value")`: the field at `path` equals `value`
    At { path: String, value: String },
}

impl Predicate {
    pub fn at(path: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::At {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Match documents of the given custom type
    pub fn document_type(document_type: &str) -> Self {
        Self::at(DOCUMENT_TYPE, document_type)
    }

    /// Match the document of `document_type` whose uid is `uid`
    pub fn uid(document_type: &str, uid: &str) -> Self {
        Self::at(format!("my.{}.uid", document_type), uid)
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::At { path, value } => {
                write!(f, "[at({},\"{}\")]", path, value.replace('"', "\\\""))
            }
        }
    }
}

/// Render a predicate list as the `q` parameter
pub fn predicates_param(predicates: &[Predicate]) -> String {
    let inner: String = predicates.iter().map(|p| p.to_string()).collect();
    format!("[{}]", inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort key for a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub field: String,
    pub direction: Direction,
}

impl Ordering {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

impl Display for Ordering {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{}", self.field),
            Direction::Desc => write!(f, "{} desc", self.field),
        }
    }
}

/// Which version of the content to read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentRef {
    /// The published content
    #[default]
    Master,
    /// A preview ref pointing at draft content
    Preview(String),
}

impl ContentRef {
    pub fn is_preview(&self) -> bool {
        matches!(self, ContentRef::Preview(_))
    }
}

/// Options for a document search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Field projection, e.g. `posts.title`. Empty means all fields.
    pub fetch: Vec<String>,
    pub page_size: Option<usize>,
    pub orderings: Vec<Ordering>,
    /// Return results positioned after the document with this id
    pub after: Option<String>,
    pub content_ref: ContentRef,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.orderings.push(ordering);
        self
    }

    pub fn after(mut self, document_id: impl Into<String>) -> Self {
        self.after = Some(document_id.into());
        self
    }

    pub fn with_ref(mut self, content_ref: ContentRef) -> Self {
        self.content_ref = content_ref;
        self
    }

    /// Query parameters, excluding `ref` and the access token
    pub fn params(&self, predicates: &[Predicate]) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", predicates_param(predicates))];
        if !self.fetch.is_empty() {
            params.push(("fetch", self.fetch.join(",")));
        }
        if let Some(page_size) = self.page_size {
            params.push(("pageSize", page_size.to_string()));
        }
        if !self.orderings.is_empty() {
            let orderings: Vec<String> = self.orderings.iter().map(|o| o.to_string()).collect();
            params.push(("orderings", format!("[{}]", orderings.join(","))));
        }
        if let Some(ref after) = self.after {
            params.push(("after", after.clone()));
        }
        params
    }
}
