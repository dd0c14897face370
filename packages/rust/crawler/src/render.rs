//! Plain-text rendering of content blocks for embedding.

use webextract_shared::ContentBlock;

/// Separator placed between rendered blocks.
const BLOCK_SEPARATOR: &str = ". ";

/// Render one block. Unknown kinds render as an empty string.
pub fn render_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { content } => content.clone(),
        ContentBlock::Link { text, url } => format!("[{text}]({url})"),
        ContentBlock::Image { src, alt } => format!("[Image: {alt}]({src})"),
        ContentBlock::Heading { level, content } => {
            format!("{} {content}", "#".repeat(usize::from(*level)))
        }
        ContentBlock::List { items } => items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
        ContentBlock::Table { headers, rows } => {
            let body = rows
                .iter()
                .map(|row| row.join(", "))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Table: {}\n{body}", headers.join(", "))
        }
        ContentBlock::Quote { content } => format!("> {content}"),
        ContentBlock::Meta { description } => format!("Meta Description: {description}"),
        ContentBlock::Unknown => String::new(),
    }
}

/// Render a block sequence as one document.
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
