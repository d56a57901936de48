use ged_model::{DocumentFile, IconKey};
use encoding_rs::{Encoding, UTF_8};

/// A fetched file, classified for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentView {
    Pdf(Vec<u8>),
    /// HTML body decoded to UTF-8.
    Html(String),
    Other { content_type: String, bytes: Vec<u8> },
}

impl DocumentView {
    /// Classifies by media type; a generic binary type falls back to the extension.
    pub fn classify(file: DocumentFile, extension_hint: &str) -> Self {
        let mime = file.mime();
        let generic = mime.is_empty() || mime == "application/octet-stream";
        let by_ext = IconKey::from_extension(extension_hint);
        if mime == "application/pdf" || (generic && by_ext == IconKey::Pdf) {
            return DocumentView::Pdf(file.bytes);
        }
        if mime == "text/html" || mime == "application/xhtml+xml" || (generic && by_ext == IconKey::Html) {
            let charset = file.charset();
            return DocumentView::Html(decode_text(&file.bytes, charset.as_deref()));
        }
        DocumentView::Other { content_type: file.content_type, bytes: file.bytes }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocumentView::Pdf(_) => "pdf",
            DocumentView::Html(_) => "html",
            DocumentView::Other { .. } => "other",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DocumentView::Pdf(bytes) => bytes,
            DocumentView::Html(text) => text.as_bytes(),
            DocumentView::Other { bytes, .. } => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// `name` with an extension matching the content, for saving to disk.
    ///
    /// The result is a single path component: separators and other unsafe
    /// characters in `name` become `_`, leading dots are dropped, and an
    /// extension keeps only its ASCII alphanumerics.
    pub fn file_name(&self, name: &str, extension: &str) -> String {
        let ext: String = match self {
            DocumentView::Pdf(_) => "pdf".into(),
            DocumentView::Html(_) => "html".into(),
            DocumentView::Other { .. } => extension.chars().filter(char::is_ascii_alphanumeric).collect(),
        };
        let stem: String = name
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') { c } else { '_' })
            .collect();
        let stem = stem.trim_start_matches('.').trim();
        let stem = if stem.is_empty() { "document" } else { stem };
        if ext.is_empty() || stem.to_ascii_lowercase().ends_with(&format!(".{}", ext.to_ascii_lowercase())) {
            stem.to_string()
        } else {
            format!("{stem}.{ext}")
        }
    }
}

/// Decodes with the declared charset (UTF-8 when unknown); a BOM wins over the label.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _used, _had_errors) = encoding.decode(bytes);
    text.into_owned()
}
