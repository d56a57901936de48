//! Shared models used across the GED client crates

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Prefix of the synthetic root label: `"Protocol {label}"`.
pub const ROOT_LABEL_PREFIX: &str = "Protocol";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid document id `{0}`")]
    InvalidDocumentId(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Numeric document identifier.
///
/// The backend is not consistent about the JSON type of ids (numbers in search
/// payloads, strings in some legacy endpoints). Both forms decode to the same
/// value here so nothing past this boundary ever compares ids as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub i64);

impl DocumentId {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        raw.trim()
            .parse::<i64>()
            .map(DocumentId)
            .map_err(|_| ModelError::InvalidDocumentId(raw.to_string()))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DocumentId {
    fn from(v: i64) -> Self {
        DocumentId(v)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl<'de> Visitor<'de> for IdVisitor {
            type Value = DocumentId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<DocumentId, E> {
                Ok(DocumentId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<DocumentId, E> {
                i64::try_from(v)
                    .map(DocumentId)
                    .map_err(|_| E::custom(format!("document id {v} out of range")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<DocumentId, E> {
                DocumentId::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// One document found by a search query, as returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub id: DocumentId,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub name: String,
    /// Protocol (case/process number) the document is filed under.
    #[serde(default)]
    pub protocol_number: Option<String>,
    /// Protocol assigned by the backend when none was given at registration.
    #[serde(default)]
    pub generated_protocol: Option<String>,
    /// Server-assigned sibling order within the protocol.
    #[serde(default, deserialize_with = "order_or_zero")]
    pub tree_order: i64,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub extension: String,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl SearchResultItem {
    pub fn new(id: i64, name: impl Into<String>, tree_order: i64) -> Self {
        Self {
            id: DocumentId(id),
            name: name.into(),
            protocol_number: None,
            generated_protocol: None,
            tree_order,
            extension: String::new(),
            document_type: None,
            subject: None,
            created_at: None,
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol_number = Some(protocol.into());
        self
    }

    pub fn with_generated_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.generated_protocol = Some(protocol.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn order_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawOrder {
        Int(i64),
        Text(String),
    }
    match Option::<RawOrder>::deserialize(deserializer)? {
        None => Ok(0),
        Some(RawOrder::Int(v)) => Ok(v),
        Some(RawOrder::Text(s)) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// Which search form produced the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Protocol,
    Name,
    Id,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Body of a search API call. Unset filters are omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_id: Option<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sort_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sort_direction: Option<SortDirection>,
}

impl SearchRequest {
    fn empty(search_type: SearchType) -> Self {
        Self {
            search_type,
            text: None,
            protocol: None,
            document_id: None,
            document_type: None,
            date_from: None,
            date_to: None,
            page: None,
            page_size: None,
            sort_by: None,
            sort_direction: None,
        }
    }

    pub fn by_protocol(protocol: impl Into<String>) -> Self {
        Self { protocol: Some(protocol.into()), ..Self::empty(SearchType::Protocol) }
    }

    pub fn by_name(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::empty(SearchType::Name) }
    }

    pub fn by_id(id: DocumentId) -> Self {
        Self { document_id: Some(id), ..Self::empty(SearchType::Id) }
    }

    pub fn advanced() -> Self {
        Self::empty(SearchType::Advanced)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(field.into());
        self.sort_direction = Some(direction);
        self
    }

    /// Human-readable form of the main criterion, used as a fallback tree label.
    pub fn criterion(&self) -> String {
        match self.search_type {
            SearchType::Protocol => self.protocol.clone().unwrap_or_default(),
            SearchType::Name => self.text.clone().unwrap_or_default(),
            SearchType::Id => self.document_id.map(|id| id.to_string()).unwrap_or_default(),
            SearchType::Advanced => self
                .protocol
                .clone()
                .or_else(|| self.text.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Envelope returned by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<SearchResultItem>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SearchResponse {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        serde_json::from_slice(bytes).map_err(|e| ModelError::Decode(e.to_string()))
    }
}

/// Raw file returned by the document-file API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentFile {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { content_type: content_type.into(), bytes }
    }

    /// Lower-cased media type without parameters (`text/html; charset=...` -> `text/html`).
    pub fn mime(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    /// `charset` parameter of the content type, if any.
    pub fn charset(&self) -> Option<String> {
        self.content_type.split(';').skip(1).find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"').to_string())
            } else {
                None
            }
        })
    }
}

/// Icon shown next to a leaf, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconKey {
    Pdf,
    Html,
    Word,
    Spreadsheet,
    Image,
    Text,
    Generic,
}

impl IconKey {
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => IconKey::Pdf,
            "html" | "htm" | "xhtml" => IconKey::Html,
            "doc" | "docx" | "odt" | "rtf" => IconKey::Word,
            "xls" | "xlsx" | "ods" | "csv" => IconKey::Spreadsheet,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" | "webp" => IconKey::Image,
            "txt" | "md" => IconKey::Text,
            _ => IconKey::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IconKey::Pdf => "pdf",
            IconKey::Html => "html",
            IconKey::Word => "word",
            IconKey::Spreadsheet => "spreadsheet",
            IconKey::Image => "image",
            IconKey::Text => "text",
            IconKey::Generic => "file",
        }
    }
}

/// A clickable document entry under the protocol root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeLeaf {
    pub id: DocumentId,
    pub name: String,
    pub icon: IconKey,
    pub extension: String,
    pub label: String,
}

/// Presentation tree: one synthetic protocol root and a flat list of documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Root display text, `"Protocol {protocol}"`.
    pub label: String,
    pub protocol: String,
    pub children: Vec<TreeLeaf>,
}

impl TreeNode {
    pub fn empty(protocol: impl Into<String>) -> Self {
        let protocol = protocol.into();
        Self { label: format!("{ROOT_LABEL_PREFIX} {protocol}"), protocol, children: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn find(&self, id: DocumentId) -> Option<&TreeLeaf> {
        self.children.iter().find(|leaf| leaf.id == id)
    }
}

/// What a click on a leaf yields: enough to fetch and label the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub doc_id: DocumentId,
    pub extension: String,
    pub name: String,
}

impl From<&TreeLeaf> for SelectionEvent {
    fn from(leaf: &TreeLeaf) -> Self {
        Self { doc_id: leaf.id, extension: leaf.extension.clone(), name: leaf.name.clone() }
    }
}
