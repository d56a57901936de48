//! Navigation parameters that open the browser on a protocol and a document.

use ged_model::DocumentId;
use tracing::warn;
use url::{form_urlencoded, Url};

use crate::auto_select::PendingAutoSelection;

pub const PARAM_PROTOCOL: &str = "protocol";
pub const PARAM_DOCUMENT_ID: &str = "documentId";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepLink {
    pub protocol: Option<String>,
    pub document_id: Option<DocumentId>,
}

impl DeepLink {
    /// Accepts a full URL (query in the path part or after a `#/route?`) or a
    /// bare query string with or without the leading `?`. Unknown parameters
    /// are ignored, so is a `documentId` that is not an integer.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let mut link = DeepLink::default();
        if input.contains("://") {
            match Url::parse(input) {
                Ok(url) => {
                    if let Some(query) = url.query() {
                        link.absorb(query);
                    }
                    if let Some((_, query)) = url.fragment().and_then(|f| f.split_once('?')) {
                        link.absorb(query);
                    }
                }
                Err(err) => warn!(error = %err, "deep link is not a valid URL"),
            }
        } else {
            let query = input.split_once('?').map(|(_, q)| q).unwrap_or(input);
            link.absorb(query);
        }
        link
    }

    fn absorb(&mut self, query: &str) {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                PARAM_PROTOCOL => {
                    let value = value.trim();
                    if !value.is_empty() {
                        self.protocol = Some(value.to_string());
                    }
                }
                PARAM_DOCUMENT_ID => match DocumentId::parse(&value) {
                    Ok(id) => self.document_id = Some(id),
                    Err(_) => warn!(value = %value, "ignoring non-numeric documentId"),
                },
                _ => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.protocol.is_none() && self.document_id.is_none()
    }

    pub fn pending(&self) -> PendingAutoSelection {
        PendingAutoSelection::new(self.document_id)
    }
}
