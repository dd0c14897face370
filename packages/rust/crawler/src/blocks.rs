//! Content block extraction.
//!
//! Walks a [`DomSnapshot`] in document order, skips boilerplate subtrees,
//! classifies each visible element into at most one [`ContentBlock`], and
//! collects the blocks either flat or grouped by section boundaries.

use webextract_shared::{ContentBlock, ContentGroup, META_GROUP_ID};
use webextract_text::truncate_with_ellipsis;

use crate::dom::{DomSnapshot, DomTree, ElementNode};

/// Elements whose whole subtree is boilerplate.
const IGNORED_TAGS: [&str; 8] = [
    "nav", "footer", "header", "aside", "script", "style", "noscript", "iframe",
];

/// Class names marking boilerplate subtrees.
const IGNORED_CLASSES: [&str; 3] = ["advertisement", "sidebar", "comment"];

/// Elements that close the current group and open a new one.
const GROUP_BOUNDARY_TAGS: [&str; 5] = ["section", "article", "h1", "h2", "h3"];

/// Text blocks are compared against this many trailing blocks of their scope.
const DEDUP_WINDOW: usize = 10;

const TEXT_LIMIT: usize = 1000;
const HEADING_LIMIT: usize = 200;
const LIST_ITEM_LIMIT: usize = 200;
const TABLE_CELL_LIMIT: usize = 100;
const LINK_TEXT_LIMIT: usize = 100;
const ALT_LIMIT: usize = 100;
const QUOTE_LIMIT: usize = 500;
const META_LIMIT: usize = 200;

const MISSING_ALT: &str = "No alt text provided";

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Extract a flat, de-duplicated block list. The meta description, if any, comes first.
pub fn extract_blocks(snapshot: &DomSnapshot) -> Vec<ContentBlock> {
    let tree = DomTree::new(snapshot);
    let mut scope = BlockScope::default();

    if let Some(meta) = meta_block(snapshot) {
        scope.push(meta);
    }

    walk(&tree, |id, el| {
        if let Some(block) = classify(&tree, id, el) {
            scope.push(block);
        }
    });

    scope.blocks
}

/// Extract blocks grouped at `section`, `article`, and `h1`–`h3` boundaries.
///
/// A meta group (`group_id = "meta"`) comes first when the page has a
/// description; content groups are numbered `group1`, `group2`, ... in the
/// order they were opened, and empty groups are dropped.
pub fn extract_groups(snapshot: &DomSnapshot) -> Vec<ContentGroup> {
    let tree = DomTree::new(snapshot);
    let mut grouper = Grouper::default();

    if let Some(meta) = meta_block(snapshot) {
        grouper.groups.push(ContentGroup {
            group_id: META_GROUP_ID.to_string(),
            blocks: vec![meta],
        });
    }

    walk(&tree, |id, el| {
        if GROUP_BOUNDARY_TAGS.contains(&el.tag.as_str()) || grouper.current.is_none() {
            grouper.open();
        }
        if let Some(block) = classify(&tree, id, el) {
            grouper.push(block);
        }
    });

    grouper.finish()
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

fn is_ignored(el: &ElementNode) -> bool {
    IGNORED_TAGS.contains(&el.tag.as_str()) || IGNORED_CLASSES.iter().any(|c| el.has_class(c))
}

/// Pre-order walk over non-ignored elements. Ignored elements prune their subtree.
fn walk(tree: &DomTree<'_>, mut visit: impl FnMut(usize, &ElementNode)) {
    let Some(root) = tree.root() else {
        return;
    };
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let Some(el) = tree.element(id) else {
            continue;
        };
        if is_ignored(el) {
            continue;
        }
        visit(id, el);
        stack.extend(tree.children(id).iter().rev());
    }
}

fn meta_block(snapshot: &DomSnapshot) -> Option<ContentBlock> {
    snapshot
        .meta_description
        .as_deref()
        .filter(|d| !d.is_empty())
        .map(|d| ContentBlock::Meta {
            description: truncate_with_ellipsis(d, META_LIMIT),
        })
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn heading_level(tag: &str) -> Option<u8> {
    match tag.as_bytes() {
        [b'h', level @ b'1'..=b'6'] => Some(level - b'0'),
        _ => None,
    }
}

/// Classify one visible element. Children are visited separately by the walker.
fn classify(tree: &DomTree<'_>, id: usize, el: &ElementNode) -> Option<ContentBlock> {
    if !el.visible {
        return None;
    }

    let tag = el.tag.as_str();
    if let Some(level) = heading_level(tag) {
        return Some(ContentBlock::Heading {
            level,
            content: truncate_with_ellipsis(&tree.text(id), HEADING_LIMIT),
        });
    }

    match tag {
        "a" => {
            let text = tree.text(id);
            (!text.is_empty()).then(|| ContentBlock::Link {
                text: truncate_with_ellipsis(&text, LINK_TEXT_LIMIT),
                url: el.href.clone().unwrap_or_default(),
            })
        }
        "img" => {
            let alt = el.alt.as_deref().filter(|a| !a.is_empty()).unwrap_or(MISSING_ALT);
            Some(ContentBlock::Image {
                src: el.src.clone().unwrap_or_default(),
                alt: truncate_with_ellipsis(alt, ALT_LIMIT),
            })
        }
        "ul" | "ol" => {
            let items: Vec<String> = tree
                .descendants_by_tag(id, "li")
                .into_iter()
                .map(|li| truncate_with_ellipsis(&tree.text(li), LIST_ITEM_LIMIT))
                .filter(|item| !item.is_empty())
                .collect();
            (!items.is_empty()).then_some(ContentBlock::List { items })
        }
        "table" => {
            let cell = |cell_id: usize| truncate_with_ellipsis(&tree.text(cell_id), TABLE_CELL_LIMIT);
            let headers: Vec<String> = tree
                .descendants_by_tag(id, "th")
                .into_iter()
                .map(cell)
                .collect();
            let rows: Vec<Vec<String>> = tree
                .descendants_by_tag(id, "tr")
                .into_iter()
                .map(|tr| tree.descendants_by_tag(tr, "td").into_iter().map(cell).collect())
                .collect();
            (!headers.is_empty() || !rows.is_empty()).then_some(ContentBlock::Table { headers, rows })
        }
        "blockquote" | "q" => Some(ContentBlock::Quote {
            content: truncate_with_ellipsis(&tree.text(id), QUOTE_LIMIT),
        }),
        _ => {
            let text = tree.own_text(id);
            (!text.is_empty()).then(|| ContentBlock::Text {
                content: truncate_with_ellipsis(&text, TEXT_LIMIT),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// An ordered block list that drops duplicates on insert.
///
/// A text block is a duplicate when it is a substring of a text block among
/// the last [`DEDUP_WINDOW`] blocks. Any other block is a duplicate when an
/// equal block already exists anywhere in the scope.
#[derive(Debug, Default)]
struct BlockScope {
    blocks: Vec<ContentBlock>,
}

impl BlockScope {
    fn push(&mut self, block: ContentBlock) -> bool {
        let duplicate = match block.as_text() {
            Some(text) => self
                .blocks
                .iter()
                .rev()
                .take(DEDUP_WINDOW)
                .filter_map(ContentBlock::as_text)
                .any(|prev| prev.contains(text)),
            None => self.blocks.contains(&block),
        };
        if !duplicate {
            self.blocks.push(block);
        }
        !duplicate
    }
}

#[derive(Debug, Default)]
struct Grouper {
    groups: Vec<ContentGroup>,
    current: Option<(String, BlockScope)>,
    opened: usize,
}

impl Grouper {
    /// Close the current group (kept only if non-empty) and start a new one.
    fn open(&mut self) {
        self.close();
        self.opened += 1;
        self.current = Some((format!("group{}", self.opened), BlockScope::default()));
    }

    fn close(&mut self) {
        match self.current.take() {
            Some((group_id, scope)) if !scope.blocks.is_empty() => {
                self.groups.push(ContentGroup {
                    group_id,
                    blocks: scope.blocks,
                });
            }
            _ => {}
        }
    }

    fn push(&mut self, block: ContentBlock) {
        if let Some((_, scope)) = self.current.as_mut() {
            scope.push(block);
        }
    }

    fn finish(mut self) -> Vec<ContentGroup> {
        self.close();
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(html: &str) -> DomSnapshot {
        DomSnapshot::from_html(html, None)
    }

    fn text(s: &str) -> ContentBlock {
        ContentBlock::Text { content: s.into() }
    }

    #[test]
    fn heading_paragraph_and_meta() {
        let snap = snapshot(
            r#"<html><head><meta name="description" content="D"></head>
            <body><h1>Title</h1><p>hello world</p></body></html>"#,
        );
        assert_eq!(
            extract_blocks(&snap),
            vec![
                ContentBlock::Meta {
                    description: "D".into()
                },
                ContentBlock::Heading {
                    level: 1,
                    content: "Title".into()
                },
                text("hello world"),
            ]
        );
    }

    #[test]
    fn boilerplate_is_skipped() {
        let snap = snapshot(
            r#"<body><nav><a href="/x">Home</a></nav><header><h1>Site</h1></header>
            <div class="sidebar"><p>Related</p></div><div class="card advertisement">Buy</div>
            <p>Body copy</p><footer>(c) 2024</footer></body>"#,
        );
        assert_eq!(extract_blocks(&snap), vec![text("Body copy")]);
    }

    #[test]
    fn classifies_each_kind() {
        let html = r#"<body>
            <a href="https://example.com/docs">Read the docs</a>
            <a href="https://example.com/empty"></a>
            <img src="https://example.com/a.png">
            <h4>Sub heading</h4>
            <ol><li>one</li><li> </li><li>two</li></ol>
            <table><tr><th>Name</th><th>Age</th></tr><tr><td>Ann</td><td>30</td></tr></table>
            <blockquote>Stay hungry</blockquote>
        </body>"#;
        let blocks = extract_blocks(&snapshot(html));

        assert!(blocks.contains(&ContentBlock::Link {
            text: "Read the docs".into(),
            url: "https://example.com/docs".into(),
        }));
        assert!(!blocks.iter().any(|b| matches!(b, ContentBlock::Link { url, .. } if url.ends_with("empty"))));
        assert!(blocks.contains(&ContentBlock::Image {
            src: "https://example.com/a.png".into(),
            alt: "No alt text provided".into(),
        }));
        assert!(blocks.contains(&ContentBlock::Heading {
            level: 4,
            content: "Sub heading".into(),
        }));
        assert!(blocks.contains(&ContentBlock::List {
            items: vec!["one".into(), "two".into()],
        }));
        assert!(blocks.contains(&ContentBlock::Table {
            headers: vec!["Name".into(), "Age".into()],
            rows: vec![vec![], vec!["Ann".into(), "30".into()]],
        }));
        assert!(blocks.contains(&ContentBlock::Quote {
            content: "Stay hungry".into(),
        }));
    }

    #[test]
    fn long_fields_are_truncated() {
        let long = "x".repeat(1500);
        let html = format!("<body><p>{long}</p><h2>{long}</h2></body>");
        let blocks = extract_blocks(&snapshot(&html));
        assert_eq!(blocks[0], text(&format!("{}...", "x".repeat(TEXT_LIMIT))));
        match &blocks[1] {
            ContentBlock::Heading { content, .. } => {
                assert_eq!(content.chars().count(), HEADING_LIMIT + 3)
            }
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn inline_children_do_not_duplicate_text() {
        let blocks = extract_blocks(&snapshot("<body><p>hello <b>world</b></p></body>"));
        assert_eq!(blocks, vec![text("hello world")]);
    }

    #[test]
    fn repeated_text_within_window_is_emitted_once() {
        let blocks = extract_blocks(&snapshot("<body><p>same</p><p>other</p><p>same</p></body>"));
        assert_eq!(blocks, vec![text("same"), text("other")]);
    }

    #[test]
    fn repeated_text_outside_window_is_kept() {
        let fillers: String = (0..DEDUP_WINDOW + 1)
            .map(|i| format!("<p>filler {i}</p>"))
            .collect();
        let html = format!("<body><p>same</p>{fillers}<p>same</p></body>");
        let blocks = extract_blocks(&snapshot(&html));
        let count = blocks.iter().filter(|b| **b == text("same")).count();
        assert_eq!(count, 2);
    }

    #[test]
    fn equal_non_text_blocks_dedup_across_scope() {
        let fillers: String = (0..15).map(|i| format!("<p>filler {i}</p>")).collect();
        let html = format!(
            r#"<body><a href="https://e.com/">Home</a>{fillers}<a href="https://e.com/">Home</a></body>"#
        );
        let links = extract_blocks(&snapshot(&html))
            .into_iter()
            .filter(|b| matches!(b, ContentBlock::Link { .. }))
            .count();
        assert_eq!(links, 1);
    }

    #[test]
    fn articles_form_groups() {
        let html = "<body><article><h2>A</h2><p>x</p></article><article><h2>B</h2><p>y</p></article></body>";
        let groups = extract_groups(&snapshot(html));

        assert_eq!(groups.len(), 2);
        let heading = |s: &str| ContentBlock::Heading {
            level: 2,
            content: s.into(),
        };
        assert_eq!(groups[0].blocks, vec![heading("A"), text("x")]);
        assert_eq!(groups[1].blocks, vec![heading("B"), text("y")]);
        assert!(groups.iter().all(|g| g.group_id.starts_with("group")));
        assert_ne!(groups[0].group_id, groups[1].group_id);
    }

    #[test]
    fn meta_group_comes_first() {
        let html = r#"<html><head><meta name="description" content="Summary"></head>
            <body><p>intro</p><section><h3>Part</h3></section></body></html>"#;
        let groups = extract_groups(&snapshot(html));
        assert_eq!(groups[0].group_id, META_GROUP_ID);
        assert_eq!(groups[1].blocks, vec![text("intro")]);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn dedup_is_scoped_per_group() {
        let html = "<body><section><p>shared</p></section><section><p>shared</p></section></body>";
        let groups = extract_groups(&snapshot(html));
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.blocks == vec![text("shared")]));
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extract_blocks(&DomSnapshot::default()).is_empty());
        assert!(extract_groups(&snapshot("<body></body>")).is_empty());
    }
}
