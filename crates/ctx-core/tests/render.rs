//! Renderers driven through the event session over real fixture trees.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ctx_core::classify::EntryClassifier;
use ctx_core::ignore::{IgnoreOptions, IgnoreResolver};
use ctx_core::render::{
    JsonRenderer, RawRenderer, RenderMode, RenderOptions, ToonRenderer, XmlRenderer,
};
use ctx_core::roots::resolve_roots_in;
use ctx_core::session::EventSession;
use ctx_core::traverse::{TraversalEngine, TraversalOptions};
use ctx_test_utils::FixtureTree;
use ctx_test_utils::fixture::png_bytes;
use ctx_test_utils::tracing_setup::init_test_tracing;
use pretty_assertions::assert_eq;
use serde_json::Value;

fn engine(include_content: bool) -> Arc<TraversalEngine> {
    Arc::new(TraversalEngine::new(
        IgnoreResolver::new(IgnoreOptions::default()).unwrap(),
        EntryClassifier::default(),
        None,
        TraversalOptions {
            include_content,
            chunk_size: 6,
        },
    ))
}

fn options(mode: RenderMode) -> RenderOptions {
    RenderOptions {
        mode,
        include_summary: true,
    }
}

async fn render_json(base: &Path, inputs: &[&str], mode: RenderMode) -> String {
    init_test_tracing();
    let roots = resolve_roots_in(base, inputs).unwrap();
    let renderer = JsonRenderer::new(Vec::new(), Vec::new(), options(mode));
    let (renderer, _) = EventSession::new(4)
        .run(engine(mode == RenderMode::Content), roots, renderer)
        .await
        .unwrap();
    String::from_utf8(renderer.into_parts().0).unwrap()
}

fn sample_tree() -> FixtureTree {
    let tree = FixtureTree::new();
    tree.file("a.txt", "hello")
        .file("sub/b.txt", "0123456789")
        .file("sub/deeper/c.md", "# title\n\nsome \"quoted\" <text> & more\n")
        .png("img/logo.png");
    tree
}

fn strip_last_modified(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("lastModified");
            map.values_mut().for_each(strip_last_modified);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_last_modified),
        _ => {}
    }
}

fn collect_paths(value: &Value, out: &mut Vec<String>) {
    if let Some(path) = value["path"].as_str() {
        out.push(path.to_string());
    }
    if let Some(children) = value["children"].as_array() {
        children.iter().for_each(|c| collect_paths(c, out));
    }
}

#[tokio::test]
async fn test_json_scenario_a() {
    let tree = FixtureTree::new();
    tree.file("a.txt", "hello").file("sub/b.txt", "0123456789");

    let out = render_json(tree.path(), &["."], RenderMode::Tree).await;
    let root: Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(root["type"], "directory");
    assert_eq!(root["totalFiles"], 2);
    assert_eq!(root["totalSize"], 15);
    let sub = &root["children"][1];
    assert_eq!(sub["name"], "sub");
    assert_eq!(sub["totalFiles"], 1);
    assert_eq!(sub["totalSize"], 10);
}

#[tokio::test]
async fn test_json_scenario_b() {
    let tree = FixtureTree::new();
    tree.file(".ignore", "[binary]\nfixture.png\n").png("fixture.png");

    let out = render_json(tree.path(), &["."], RenderMode::Content).await;
    let root: Value = serde_json::from_str(out.trim()).unwrap();
    let children = root["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    let png = &children[0];
    assert_eq!(png["type"], "binary");
    assert_eq!(png["mimeType"], "image/png");
    assert_eq!(png["content"], STANDARD.encode(png_bytes()));
}

#[tokio::test]
async fn test_json_unrevealed_binary_has_empty_content() {
    let tree = sample_tree();
    let out = render_json(tree.path(), &["img"], RenderMode::Content).await;
    let root: Value = serde_json::from_str(out.trim()).unwrap();
    let logo = &root["children"][0];
    assert_eq!(logo["content"], "");
    assert_eq!(logo["mimeType"], "image/png");
}

#[tokio::test]
async fn test_chunked_text_content_reassembles() {
    let tree = sample_tree();
    let out = render_json(tree.path(), &["sub/deeper/c.md"], RenderMode::Content).await;
    let node: Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(node["content"], "# title\n\nsome \"quoted\" <text> & more\n");
}

#[tokio::test]
async fn test_json_is_deterministic_aside_from_timestamps() {
    let tree = sample_tree();
    let first = render_json(tree.path(), &[".", "a.txt"], RenderMode::Content).await;
    let second = render_json(tree.path(), &[".", "a.txt"], RenderMode::Content).await;

    let normalize = |text: &str| -> Vec<Value> {
        text.lines()
            .map(|line| {
                let mut value: Value = serde_json::from_str(line).unwrap();
                strip_last_modified(&mut value);
                value
            })
            .collect()
    };
    assert_eq!(normalize(&first), normalize(&second));
    assert_eq!(first.lines().count(), 2);
}

#[tokio::test]
async fn test_renderers_agree_on_entries() {
    init_test_tracing();
    let tree = sample_tree();
    let json = render_json(tree.path(), &["."], RenderMode::Tree).await;
    let mut expected = Vec::new();
    collect_paths(&serde_json::from_str(json.trim()).unwrap(), &mut expected);
    assert_eq!(expected.len(), 8);

    let roots = || resolve_roots_in(tree.path(), &["."]).unwrap();
    let session = EventSession::new(2);

    let xml = XmlRenderer::new(Vec::new(), Vec::new(), options(RenderMode::Tree));
    let (xml, _) = session.run(engine(false), roots(), xml).await.unwrap();
    let xml = String::from_utf8(xml.into_parts().0).unwrap();

    let toon = ToonRenderer::new(Vec::new(), Vec::new(), options(RenderMode::Tree));
    let (toon, _) = session.run(engine(false), roots(), toon).await.unwrap();
    let toon = String::from_utf8(toon.into_parts().0).unwrap();

    let raw = RawRenderer::new(Vec::new(), Vec::new(), options(RenderMode::Tree));
    let (raw, outcome) = session.run(engine(false), roots(), raw).await.unwrap();
    let raw = String::from_utf8(raw.into_parts().0).unwrap();

    assert_eq!(outcome.files + outcome.directories, expected.len() as u64);
    for path in &expected {
        assert!(xml.contains(&format!("<path>{path}</path>")), "xml misses {path}");
        assert!(toon.contains(&format!("path: {path}\n")), "toon misses {path}");
        assert!(raw.contains(path.as_str()), "raw misses {path}");
    }
    assert_eq!(xml.matches("<node>").count(), expected.len());
    assert!(xml.contains("<totalFiles>4</totalFiles>"));
    assert!(toon.contains("summary:\n  totalFiles: 4\n"));
    assert!(raw.ends_with("Summary: 4 files, 120b\n\n"), "{raw}");
}

#[tokio::test]
async fn test_raw_content_skips_unrevealed_binary() {
    let tree = sample_tree();
    let roots = resolve_roots_in(tree.path(), &["."]).unwrap();
    let raw = RawRenderer::new(Vec::new(), Vec::new(), options(RenderMode::Content));
    let (raw, _) = EventSession::default()
        .run(engine(true), roots, raw)
        .await
        .unwrap();
    let out = String::from_utf8(raw.into_parts().0).unwrap();
    assert!(out.contains(&format!("File: {}\nhello\nEnd of file:", tree.join("a.txt").display())));
    assert!(!out.contains("logo.png"));
    assert_eq!(out.matches("End of file:").count(), 3);
}
