//! Core domain types: content blocks, extraction templates, pipeline output.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ContentBlock
// ---------------------------------------------------------------------------

/// One semantically classified unit of page content.
///
/// Serialized with an internal `type` tag. Kinds this version does not know
/// deserialize to [`ContentBlock::Unknown`] and render as nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        content: String,
    },
    Link {
        text: String,
        url: String,
    },
    Image {
        src: String,
        alt: String,
    },
    Heading {
        level: u8,
        content: String,
    },
    List {
        items: Vec<String>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Quote {
        content: String,
    },
    Meta {
        description: String,
    },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    /// Text payload used for substring de-duplication, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// Group id reserved for the page's meta description.
pub const META_GROUP_ID: &str = "meta";

/// An ordered run of blocks sharing a section boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentGroup {
    pub group_id: String,
    pub blocks: Vec<ContentBlock>,
}

/// Output of the extractor in either mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapedContent {
    Grouped(Vec<ContentGroup>),
    Flat(Vec<ContentBlock>),
}

impl ScrapedContent {
    /// Total number of blocks across all groups.
    pub fn block_count(&self) -> usize {
        match self {
            Self::Grouped(groups) => groups.iter().map(|g| g.blocks.len()).sum(),
            Self::Flat(blocks) => blocks.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction templates
// ---------------------------------------------------------------------------

/// Value types an attribute (or one of its nested properties) may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ValueType {
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::String | Self::Number | Self::Boolean)
    }
}

/// A nested property of an object attribute or of array items.
///
/// Nested properties carry their own name and description and must be a
/// primitive type; validation rejects the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleAttribute {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ValueType,
}

/// Element shape of an array attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayItems {
    #[serde(rename = "type")]
    pub kind: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<SimpleAttribute>>,
}

/// Declared shape of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Number,
    Boolean,
    Object {
        #[serde(default)]
        properties: Vec<SimpleAttribute>,
    },
    Array {
        items: ArrayItems,
    },
}

/// One field the caller wants extracted from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl Attribute {
    /// A plain string attribute.
    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: AttributeKind::String,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A request for assembled context: the caller's template plus run flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    /// Template identifier; part of the cache key.
    pub id: String,
    pub url: String,
    pub attributes: Vec<Attribute>,
    #[serde(default = "default_true")]
    pub is_group_scraping: bool,
    #[serde(default)]
    pub ignore_cache: bool,
}

impl ContextRequest {
    pub fn new(id: impl Into<String>, url: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            attributes,
            is_group_scraping: true,
            ignore_cache: false,
        }
    }

    /// Cache and in-flight key: `"{id}-{url}"`.
    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.id, self.url)
    }
}

// ---------------------------------------------------------------------------
// Pipeline output
// ---------------------------------------------------------------------------

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOutput {
    pub scrape_execution_time: String,
    pub embedding_time: String,
    pub context: String,
    pub stored_document_ids: Vec<String>,
}

impl ContextOutput {
    /// Output for a cache hit: zero timings, nothing stored.
    pub fn cached(context: String) -> Self {
        Self {
            scrape_execution_time: format_elapsed(Duration::ZERO),
            embedding_time: format_elapsed(Duration::ZERO),
            context,
            stored_document_ids: Vec::new(),
        }
    }
}

/// Format a duration as whole milliseconds, e.g. `"412 ms"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{} ms", elapsed.as_millis())
}

// ---------------------------------------------------------------------------
// VectorDocument
// ---------------------------------------------------------------------------

/// Provenance attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source page URL; retrieval filters on it.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// A text chunk destined for (or returned from) the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_use_type_tag() {
        let block = ContentBlock::Heading {
            level: 2,
            content: "Install".into(),
        };
        let json = serde_json::to_value(&block).expect("serialize");
        assert_eq!(json["type"], "heading");
        assert_eq!(json["level"], 2);
    }

    #[test]
    fn unrecognized_block_kind_is_unknown() {
        let block: ContentBlock =
            serde_json::from_str(r#"{"type":"video","src":"a.mp4"}"#).expect("parse");
        assert_eq!(block, ContentBlock::Unknown);
    }

    #[test]
    fn request_defaults_and_cache_key() {
        let request: ContextRequest = serde_json::from_str(
            r#"{"id":"t1","url":"https://example.com","attributes":[
                {"name":"title","description":"page title","type":"string"},
                {"name":"tags","description":"tags","type":"array","items":{"type":"string"}}
            ]}"#,
        )
        .expect("parse");
        assert!(request.is_group_scraping);
        assert!(!request.ignore_cache);
        assert_eq!(request.cache_key(), "t1-https://example.com");
        assert!(matches!(request.attributes[1].kind, AttributeKind::Array { .. }));
    }

    #[test]
    fn nested_properties_are_a_list_in_declaration_order() {
        let attribute: Attribute = serde_json::from_str(
            r#"{"name":"size","description":"dimensions","type":"object","properties":[
                {"name":"width","description":"w","type":"number"},
                {"name":"height","description":"h","type":"number"}
            ]}"#,
        )
        .expect("parse");
        let AttributeKind::Object { properties } = attribute.kind else {
            panic!("expected object attribute");
        };
        let names: Vec<_> = properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["width", "height"]);
        assert_eq!(properties[0].kind, ValueType::Number);

        let items: ArrayItems = serde_json::from_str(
            r#"{"type":"object","properties":[{"name":"stars","description":"s","type":"number"}]}"#,
        )
        .expect("parse items");
        assert_eq!(items.properties.map(|p| p.len()), Some(1));
    }

    #[test]
    fn cached_output_has_zero_timings() {
        let out = ContextOutput::cached("ctx".into());
        assert_eq!(out.scrape_execution_time, "0 ms");
        assert_eq!(out.embedding_time, "0 ms");
        assert!(out.stored_document_ids.is_empty());
        let json = serde_json::to_value(&out).expect("serialize");
        assert!(json.get("storedDocumentIds").is_some());
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(1234)), "1234 ms");
    }
}
