//! Serialized DOM snapshots.
//!
//! A [`DomSnapshot`] is a flat, pre-order list of element and text nodes with
//! parent indices, rooted at `<body>`. The browser produces one with
//! `snapshot.js`; [`DomSnapshot::from_html`] builds the same shape from static
//! HTML. Keeping the tree flat avoids deep nesting in the wire format.

use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use webextract_text::normalize_whitespace;

/// Elements whose text never contributes to visible text.
const NON_TEXT_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Phrasing elements that continue the surrounding line of text.
const INLINE_TAGS: [&str; 25] = [
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "font", "i", "kbd",
    "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u",
];

/// Elements that never have a layout box of their own.
const BOXLESS_TAGS: [&str; 3] = ["html", "head", "body"];

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// A page's DOM as captured after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// Content of `<meta name="description">`, if present and non-empty.
    #[serde(default)]
    pub meta_description: Option<String>,
    /// Pre-order nodes; `nodes[0]` is `<body>` when the page has one.
    #[serde(default)]
    pub nodes: Vec<DomNode>,
}

/// One node of the flattened tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomNode {
    Element(ElementNode),
    Text(TextNode),
}

impl DomNode {
    pub fn parent(&self) -> Option<usize> {
        match self {
            Self::Element(el) => el.parent,
            Self::Text(text) => text.parent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    #[serde(default)]
    pub parent: Option<usize>,
    /// Lower-case tag name.
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Whether the element has a rendered layout box.
    #[serde(default)]
    pub visible: bool,
    /// Absolute link target for anchors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Absolute source for images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl ElementNode {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    fn is_inline(&self) -> bool {
        INLINE_TAGS.contains(&self.tag.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    #[serde(default)]
    pub parent: Option<usize>,
    pub text: String,
}

// ---------------------------------------------------------------------------
// DomTree: child index over a snapshot
// ---------------------------------------------------------------------------

/// Read-only navigation over a [`DomSnapshot`].
pub struct DomTree<'a> {
    nodes: &'a [DomNode],
    children: Vec<Vec<usize>>,
}

impl<'a> DomTree<'a> {
    /// Index the snapshot. Nodes whose parent does not precede them are dropped.
    pub fn new(snapshot: &'a DomSnapshot) -> Self {
        let nodes = snapshot.nodes.as_slice();
        let mut children = vec![Vec::new(); nodes.len()];
        for (id, node) in nodes.iter().enumerate() {
            match node.parent() {
                Some(parent) if parent < id => children[parent].push(id),
                _ => {}
            }
        }
        Self { nodes, children }
    }

    /// The first parentless element, normally `<body>`.
    pub fn root(&self) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| matches!(n, DomNode::Element(el) if el.parent.is_none()))
    }

    pub fn element(&self, id: usize) -> Option<&'a ElementNode> {
        match self.nodes.get(id) {
            Some(DomNode::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn children(&self, id: usize) -> &[usize] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Descendant elements of `id` with tag `tag`, in document order.
    pub fn descendants_by_tag(&self, id: usize, tag: &str) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack: Vec<usize> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if let Some(el) = self.element(next) {
                if el.tag == tag {
                    found.push(next);
                }
                stack.extend(self.children(next).iter().rev());
            }
        }
        found
    }

    /// Visible text of the whole subtree, whitespace-normalized.
    pub fn text(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out, false);
        normalize_whitespace(&out)
    }

    /// Text the element contributes itself: its text nodes plus inline
    /// descendants, stopping at nested block elements.
    pub fn own_text(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out, true);
        normalize_whitespace(&out)
    }

    fn collect_text(&self, id: usize, out: &mut String, inline_only: bool) {
        enum Step {
            Node(usize),
            Space,
        }

        let mut stack: Vec<Step> = self
            .children(id)
            .iter()
            .rev()
            .map(|&c| Step::Node(c))
            .collect();
        while let Some(step) = stack.pop() {
            let child = match step {
                Step::Space => {
                    out.push(' ');
                    continue;
                }
                Step::Node(child) => child,
            };
            match &self.nodes[child] {
                DomNode::Text(text) => out.push_str(&text.text),
                DomNode::Element(el) => {
                    if NON_TEXT_TAGS.contains(&el.tag.as_str()) || !el.visible {
                        continue;
                    }
                    if el.tag == "br" {
                        out.push(' ');
                    } else if el.is_inline() {
                        stack.extend(self.children(child).iter().rev().map(|&c| Step::Node(c)));
                    } else {
                        out.push(' ');
                        if !inline_only {
                            stack.push(Step::Space);
                            stack.extend(self.children(child).iter().rev().map(|&c| Step::Node(c)));
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Static HTML → snapshot
// ---------------------------------------------------------------------------

impl DomSnapshot {
    /// Build a snapshot from static HTML.
    ///
    /// Without layout, an element counts as visible unless it (or an ancestor)
    /// carries the `hidden` attribute or an inline `display: none`. `<body>`
    /// itself is never visible. Anchor and image URLs are resolved against
    /// `base_url` when given.
    pub fn from_html(html: &str, base_url: Option<&Url>) -> Self {
        let doc = Html::parse_document(html);

        let meta_description = Selector::parse(r#"meta[name="description"]"#)
            .ok()
            .and_then(|sel| {
                doc.select(&sel)
                    .next()
                    .and_then(|el| el.value().attr("content"))
                    .map(str::to_string)
            })
            .filter(|content| !content.is_empty());

        let mut nodes = Vec::new();
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| doc.select(&sel).next());
        if let Some(body) = body {
            push_tree(&mut nodes, body, base_url);
        }

        Self {
            meta_description,
            nodes,
        }
    }
}

/// Flatten `body` in pre-order. Children go on the stack in reverse so they
/// come off in document order.
fn push_tree(nodes: &mut Vec<DomNode>, body: ElementRef<'_>, base_url: Option<&Url>) {
    let mut stack = vec![(*body, None, false)];
    while let Some((node, parent, parent_hidden)) = stack.pop() {
        match node.value() {
            Node::Text(text) if !text.is_empty() => nodes.push(DomNode::Text(TextNode {
                parent,
                text: text.to_string(),
            })),
            Node::Element(value) => {
                let tag = value.name().to_ascii_lowercase();
                let hidden = parent_hidden || is_hidden(value);
                let attr_url = |name: &str| value.attr(name).map(|raw| resolve(raw, base_url));

                let id = nodes.len();
                nodes.push(DomNode::Element(ElementNode {
                    parent,
                    visible: !hidden && !BOXLESS_TAGS.contains(&tag.as_str()),
                    classes: value.classes().map(str::to_string).collect(),
                    href: (tag == "a").then(|| attr_url("href")).flatten(),
                    src: (tag == "img").then(|| attr_url("src")).flatten(),
                    alt: (tag == "img").then(|| value.attr("alt").map(str::to_string)).flatten(),
                    tag,
                }));

                let children: Vec<_> = node.children().collect();
                stack.extend(children.into_iter().rev().map(|child| (child, Some(id), hidden)));
            }
            _ => {}
        }
    }
}

fn is_hidden(el: &scraper::node::Element) -> bool {
    if el.attr("hidden").is_some() {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        compact.to_ascii_lowercase().contains("display:none")
    })
}

fn resolve(raw: &str, base_url: Option<&Url>) -> String {
    base_url
        .and_then(|base| base.join(raw).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_of(tree: &DomTree<'_>, id: usize) -> String {
        tree.element(id).map(|el| el.tag.clone()).unwrap_or_default()
    }

    #[test]
    fn body_is_root_and_invisible() {
        let snap = DomSnapshot::from_html("<html><body><p>hi</p></body></html>", None);
        let tree = DomTree::new(&snap);
        let root = tree.root().expect("root");
        assert_eq!(tag_of(&tree, root), "body");
        assert!(!tree.element(root).expect("body").visible);
        let p = tree.children(root)[0];
        assert!(tree.element(p).expect("p").visible);
    }

    #[test]
    fn hidden_subtrees_are_invisible() {
        let html = r#"<body><div style="display: none"><p>secret</p></div><div hidden>x</div></body>"#;
        let snap = DomSnapshot::from_html(html, None);
        let visible: Vec<_> = snap
            .nodes
            .iter()
            .filter_map(|n| match n {
                DomNode::Element(el) if el.visible => Some(el.tag.as_str()),
                _ => None,
            })
            .collect();
        assert!(visible.is_empty(), "{visible:?}");
    }

    #[test]
    fn meta_description_and_urls() {
        let html = r#"<html><head><meta name="description" content="About us"></head>
            <body><a href="/docs">Docs</a><img src="logo.png" alt="Logo"></body></html>"#;
        let base = Url::parse("https://example.com/site/").expect("url");
        let snap = DomSnapshot::from_html(html, Some(&base));
        assert_eq!(snap.meta_description.as_deref(), Some("About us"));

        let anchor = snap.nodes.iter().find_map(|n| match n {
            DomNode::Element(el) if el.tag == "a" => Some(el),
            _ => None,
        });
        assert_eq!(
            anchor.and_then(|a| a.href.as_deref()),
            Some("https://example.com/docs")
        );
        let img = snap.nodes.iter().find_map(|n| match n {
            DomNode::Element(el) if el.tag == "img" => Some(el),
            _ => None,
        });
        assert_eq!(
            img.and_then(|i| i.src.as_deref()),
            Some("https://example.com/site/logo.png")
        );
    }

    #[test]
    fn own_text_stops_at_blocks() {
        let html = "<body><div>Intro <b>bold</b> text<p>Nested para</p><span>tail</span></div></body>";
        let snap = DomSnapshot::from_html(html, None);
        let tree = DomTree::new(&snap);
        let root = tree.root().expect("root");
        let div = tree.children(root)[0];
        assert_eq!(tree.own_text(div), "Intro bold text tail");
        assert_eq!(tree.text(div), "Intro bold text Nested para tail");
    }

    #[test]
    fn text_skips_scripts_and_breaks_lines() {
        let html = "<body><h1>Hello<br>World<script>var x = 1;</script></h1></body>";
        let snap = DomSnapshot::from_html(html, None);
        let tree = DomTree::new(&snap);
        let h1 = tree.descendants_by_tag(tree.root().expect("root"), "h1")[0];
        assert_eq!(tree.text(h1), "Hello World");
    }

    #[test]
    fn descendants_in_document_order() {
        let html = "<body><ul><li>a</li><li>b<ul><li>c</li></ul></li></ul></body>";
        let snap = DomSnapshot::from_html(html, None);
        let tree = DomTree::new(&snap);
        let ul = tree.children(tree.root().expect("root"))[0];
        let items: Vec<String> = tree
            .descendants_by_tag(ul, "li")
            .into_iter()
            .map(|li| tree.text(li))
            .collect();
        assert_eq!(items, vec!["a", "b c", "c"]);
    }

    #[test]
    fn deserializes_browser_payload() {
        let json = r#"{
            "meta_description": null,
            "nodes": [
                {"kind": "element", "parent": null, "tag": "body", "classes": [], "visible": false},
                {"kind": "element", "parent": 0, "tag": "p", "classes": ["lead"], "visible": true},
                {"kind": "text", "parent": 1, "text": "Hi there"}
            ]
        }"#;
        let snap: DomSnapshot = serde_json::from_str(json).expect("parse");
        let tree = DomTree::new(&snap);
        let p = tree.children(0)[0];
        assert!(tree.element(p).expect("p").has_class("lead"));
        assert_eq!(tree.own_text(p), "Hi there");
    }

    #[test]
    fn deeply_nested_markup_is_flattened_without_recursion() {
        let depth = 20_000;
        let html = format!(
            "<body><div>{}deep{}</div></body>",
            "<span>".repeat(depth),
            "</span>".repeat(depth)
        );
        let snap = DomSnapshot::from_html(&html, None);
        let tree = DomTree::new(&snap);
        let root = tree.root().expect("root");
        assert_eq!(tree.descendants_by_tag(root, "span").len(), depth);
        assert_eq!(tree.text(root), "deep");
        let div = tree.children(root)[0];
        assert_eq!(tree.own_text(div), "deep");
    }
}
