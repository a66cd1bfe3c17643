//! Wire types returned by the content API

use serde::{Deserialize, Serialize};

/// A raw CMS document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type", default)]
    pub document_type: String,
    #[serde(default)]
    pub first_publication_date: Option<String>,
    #[serde(default)]
    pub last_publication_date: Option<String>,
    /// Custom fields; shape depends on the document type
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results_per_page: u32,
    #[serde(default)]
    pub results_size: u32,
    #[serde(default)]
    pub total_results_size: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub prev_page: Option<String>,
    pub results: Vec<Document>,
}

impl SearchResponse {
    /// The cursor for the next page, with empty strings treated as absent
    pub fn next_cursor(&self) -> Option<String> {
        self.next_page.clone().filter(|c| !c.trim().is_empty())
    }
}

/// A content ref advertised by the API root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRef {
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "isMasterRef", default)]
    pub is_master_ref: bool,
}

/// The API root document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub refs: Vec<ApiRef>,
}

impl ApiInfo {
    pub fn master_ref(&self) -> Option<&str> {
        self.refs
            .iter()
            .find(|r| r.is_master_ref)
            .map(|r| r.reference.as_str())
    }
}
