//! Request validation for extraction templates.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use webextract_crawler::is_internal_target;
use webextract_shared::{
    AttributeKind, ContextRequest, FieldError, Result, ValueType, WebExtractError,
};

/// Attribute names become keys of the answer object.
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*$").expect("valid regex"));

const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "implements", "import", "in", "instanceof", "interface", "let", "new", "null", "package",
    "private", "protected", "public", "return", "static", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Check a request and return its parsed URL.
///
/// All problems are collected into a single validation error.
pub fn validate_request(request: &ContextRequest) -> Result<Url> {
    let mut errors = Vec::new();
    let mut push = |field: String, message: &str| {
        errors.push(FieldError {
            field,
            message: message.to_string(),
        })
    };

    if request.id.trim().is_empty() {
        push("id".into(), "template id is required");
    }

    let url = match Url::parse(&request.url) {
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            push("url".into(), "only http and https URLs are supported");
            None
        }
        Ok(url) if is_internal_target(&url) => {
            push("url".into(), "internal or private addresses are not allowed");
            None
        }
        Ok(url) => Some(url),
        Err(_) => {
            push("url".into(), "invalid URL format");
            None
        }
    };

    if request.attributes.is_empty() {
        push("attributes".into(), "at least one attribute is required");
    }

    for (i, attribute) in request.attributes.iter().enumerate() {
        let at = |field: &str| format!("attributes[{i}].{field}");

        if let Some(message) = name_problem(&attribute.name) {
            push(at("name"), message);
        }
        if attribute.description.trim().is_empty() {
            push(at("description"), "description is required");
        }

        let nested = match &attribute.kind {
            AttributeKind::Object { properties } => Some(("properties", properties.as_slice())),
            AttributeKind::Array { items } => {
                if items.kind == ValueType::Object
                    && items.properties.as_ref().is_none_or(|p| p.is_empty())
                {
                    push(at("items.properties"), "array of objects requires properties");
                }
                items
                    .properties
                    .as_deref()
                    .map(|properties| ("items.properties", properties))
            }
            AttributeKind::String | AttributeKind::Number | AttributeKind::Boolean => None,
        };

        if let Some((prefix, properties)) = nested {
            for (j, property) in properties.iter().enumerate() {
                let nested_at = |field: &str| at(&format!("{prefix}[{j}].{field}"));
                if let Some(message) = name_problem(&property.name) {
                    push(nested_at("name"), message);
                }
                if property.description.trim().is_empty() {
                    push(nested_at("description"), "description is required");
                }
                if !property.kind.is_primitive() {
                    push(
                        nested_at("type"),
                        "nested properties must be string, number or boolean",
                    );
                }
            }
        }
    }

    match url {
        Some(url) if errors.is_empty() => Ok(url),
        _ => Err(WebExtractError::Validation {
            message: format!("{} invalid field(s)", errors.len().max(1)),
            details: errors,
        }),
    }
}

fn name_problem(name: &str) -> Option<&'static str> {
    if !NAME_RE.is_match(name) {
        Some("must start with a letter, _ or $ and contain only letters, digits, _ or $")
    } else if RESERVED_WORDS.contains(&name) {
        Some("cannot be a reserved word")
    } else {
        None
    }
}
