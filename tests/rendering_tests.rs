mod common;

use common::fixtures::{GREETING, ledger_data, quote_data};
use common::pdf_assertions::{contains_text, page_count, page_strings};
use common::{TestResult, TestServiceBuilder, start_service};
use quire::{Config, JobState, OutputFormat, ServiceBuilder};
use serde_json::json;
use std::path::PathBuf;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_table_paginates_with_repeated_header() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let id = manager.submit("ledger", ledger_data(&["Alpha", "Bravo", "Charlie"]), OutputFormat::Native)?;
    let status = manager.wait(id).await?;
    assert_eq!(status.state, JobState::Ready);

    let artifact = manager.fetch(id)?;
    assert_eq!(page_count(&artifact.bytes), 2);
    assert_eq!(
        page_strings(&artifact.bytes),
        vec![vec!["Item", "Alpha", "Bravo"], vec!["Item", "Charlie"]]
    );

    let summary = status.artifact.expect("ready job reports its artifact");
    assert_eq!(summary.file_name, "ledger-march.pdf");
    assert_eq!(summary.size, artifact.len());
    assert_eq!(summary.sha256, artifact.sha256);
    assert_eq!(summary.sha256.len(), 64);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_input_renders_identical_bytes() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let first = manager.submit("quote", quote_data(), OutputFormat::Native)?;
    let second = manager.submit("quote", quote_data(), OutputFormat::Native)?;
    manager.wait(first).await?;
    manager.wait(second).await?;

    let (a, b) = (manager.fetch(first)?, manager.fetch(second)?);
    assert_eq!(a.bytes, b.bytes);
    assert_eq!(a.sha256, b.sha256);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quote_totals_and_formatting() -> TestResult {
    let service = start_service().await;
    let manager = &service.manager;

    let id = manager.submit("quote", quote_data(), OutputFormat::Native)?;
    manager.wait(id).await?;
    let artifact = manager.fetch(id)?;

    assert_eq!(artifact.file_name, "quote-backyard.pdf");
    assert_eq!(page_count(&artifact.bytes), 1);
    for expected in [
        "Double Oak Fencing",
        "March 07, 2025",
        "$240.00",
        "Subtotal: $435.00",
        "Tax (8.25%): $35.89",
        "Total: $470.89",
        "Quote valid for 30 days.",
    ] {
        assert!(contains_text(&artifact.bytes, expected), "missing '{}'", expected);
    }

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_font_and_glyphs_fall_back() -> TestResult {
    let service = TestServiceBuilder::new().template(GREETING).start().await;
    let manager = &service.manager;

    let id = manager.submit("greeting", json!({ "text": "Hello 世界" }), OutputFormat::Native)?;
    assert_eq!(manager.wait(id).await?.state, JobState::Ready);
    let artifact = manager.fetch(id)?;
    assert_eq!(page_strings(&artifact.bytes), vec![vec!["Hello ??"]]);

    manager.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tables_export_as_csv() -> TestResult {
    let service = start_service().await;
    let tables = service.manager.pipeline().export_csv("ledger", &ledger_data(&["Alpha", "Bravo, Inc."]))?;

    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].file_name, "table-1.csv");
    let text = tables[0].as_str().expect("csv is utf-8");
    assert_eq!(text.lines().collect::<Vec<_>>(), vec!["Item", "Alpha", "\"Bravo, Inc.\""]);

    service.manager.shutdown().await;
    Ok(())
}

#[test]
fn test_shipped_templates_render_the_demo_data() -> TestResult {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let mut config = Config::default();
    config.assets.template_dir = root.join("templates");

    let pipeline = ServiceBuilder::new(config).build_pipeline()?;
    assert!(pipeline.templates().ids().contains(&"quote".to_string()));

    let data: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(root.join("demos/quote_data.json"))?)?;
    let pdf = pipeline.render_native("quote", &data)?;
    assert_eq!(pdf.title, "Quote Backyard privacy fence");
    assert!(contains_text(&pdf.bytes, "Subtotal: $4,320.00"));
    assert!(contains_text(&pdf.bytes, "Total: $4,676.40"));
    Ok(())
}
