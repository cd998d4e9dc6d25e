use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One data instance exposing imagery capabilities.
///
/// `name` is the catalog identity, `id` is what deep links refer to. The
/// authenticated instance list spells the id `@id`; both spellings are
/// accepted. Every other field is kept verbatim in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    #[serde(default, alias = "@id")]
    pub id: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Instance {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Service endpoint used for capability checks.
    pub fn endpoint(&self) -> Option<&str> {
        self.metadata_str("url").filter(|url| !url.trim().is_empty())
    }
}
