use lopdf::content::Content;
use lopdf::{Document, Object};

/// Load PDF bytes, panicking with context on failure.
pub fn load(bytes: &[u8]) -> Document {
    Document::load_mem(bytes).unwrap_or_else(|e| panic!("output is not a readable PDF: {}", e))
}

pub fn page_count(bytes: &[u8]) -> usize {
    load(bytes).get_pages().len()
}

/// The strings shown with `Tj` on each page, in drawing order.
pub fn page_strings(bytes: &[u8]) -> Vec<Vec<String>> {
    let doc = load(bytes);
    doc.get_pages()
        .values()
        .map(|page_id| {
            let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| match op.operands.first() {
                    Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

pub fn contains_text(bytes: &[u8], needle: &str) -> bool {
    page_strings(bytes).iter().flatten().any(|s| s.contains(needle))
}
