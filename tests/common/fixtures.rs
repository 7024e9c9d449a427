use serde_json::{Value, json};

/// 300x110pt page with 20pt margins and one single-column table. Rows are
/// 20pt tall, so the header and two data rows fill a page.
pub const LEDGER: &str = r#"{
    "id": "ledger",
    "title": "Ledger {{name}}",
    "page": { "size": { "width": 300, "height": 110 }, "margins": { "top": 20, "right": 20, "bottom": 20, "left": 20 } },
    "base_style": { "family": "Helvetica", "size": 10 },
    "fields": [
        { "name": "name", "kind": "text" },
        { "name": "rows", "kind": "rows", "columns": [ { "name": "item", "kind": "text" } ] }
    ],
    "body": [
        { "type": "table", "source": "rows", "repeat_header": true,
          "columns": [ { "header": "Item", "field": "item" } ] }
    ]
}"#;

/// The shipped Double Oak quote.
pub const QUOTE: &str = include_str!("../../templates/quote.json");

/// Text in a family that does not exist, with glyphs outside WinAnsi.
pub const GREETING: &str = r#"{
    "id": "greeting",
    "title": "Greeting",
    "base_style": { "family": "No Such Family", "size": 12 },
    "fields": [ { "name": "text", "kind": "text" } ],
    "body": [ { "type": "paragraph", "text": "{{text}}" } ]
}"#;

/// One image whose bytes come from the configured resource provider.
pub const LOGO: &str = r#"{
    "id": "logo",
    "title": "Logo",
    "fields": [ { "name": "src", "kind": "text" } ],
    "body": [
        { "type": "paragraph", "text": "Letterhead" },
        { "type": "image", "src": "{{src}}", "width": 120, "height": 40 }
    ]
}"#;

pub fn ledger_data(items: &[&str]) -> Value {
    json!({
        "name": "March",
        "rows": items.iter().map(|item| json!({ "item": item })).collect::<Vec<_>>()
    })
}

pub fn quote_data() -> Value {
    json!({
        "project": "Backyard",
        "customer": "Jordan Avery",
        "date": "2025-03-07",
        "lines": [
            { "qty": 12, "item": "Cedar post", "unit": 20, "total": 240 },
            { "qty": 30, "item": "Rail", "unit": 6.5, "total": 195 }
        ]
    })
}
