use serde::{Deserialize, Serialize};

/// A queued audio source. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    uri: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

impl Track {
    /// An empty title falls back to the uri.
    pub fn new(uri: impl Into<String>, title: impl Into<String>, duration_ms: Option<u64>) -> Self {
        let uri = uri.into();
        let title = title.into();
        let title = if title.trim().is_empty() {
            uri.clone()
        } else {
            title
        };
        Self {
            uri,
            title,
            duration_ms,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}
