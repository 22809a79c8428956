//! Rendering tests
//!
//! Renders each template in /tests/templates/ and compares the result with
//! the .json file of the same name.
mod common;

use cfsync::services::LocalFileLoader;
use cfsync::template::{Template, TemplateFormat};
use common::{FakeProvider, MemoryFiles};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn read_json(path: &std::path::Path) -> serde_json::Value {
    let contents = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&contents).unwrap()
}

#[test]
fn templates() {
    insta::glob!("templates/*.yml", |path| {
        let contents = std::fs::read_to_string(path).unwrap();
        let rendered = Template::parse(&contents, TemplateFormat::Yaml)
            .and_then(|template| template.transform())
            .expect("template renders");

        let actual: serde_json::Value =
            serde_json::from_str(&rendered.to_pretty_json().unwrap()).unwrap();
        assert_eq!(actual, read_json(&path.with_extension("json")), "{}", path.display());

        // rendering is stable
        let again = rendered.transform().unwrap();
        assert_eq!(again, rendered);
    });
}

#[tokio::test]
async fn render_template_from_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("cf")).unwrap();
    std::fs::write(
        dir.path().join("cf/bucket.json"),
        r#"{"Resources": {"B": {"Type": "AWS::S3::Bucket", "Properties": {"BucketName": "|ref|Name"}}}}"#,
    )
    .unwrap();

    let rendered =
        cfsync::commands::render_template(&LocalFileLoader::default(), "cf/bucket.json", dir.path())
            .await
            .unwrap();

    let actual: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(
        actual,
        serde_json::json!({"Resources": {"B": {"Type": "AWS::S3::Bucket", "Properties": {"BucketName": {"Ref": "Name"}}}}})
    );
}

#[tokio::test]
async fn broken_templates_are_reported() {
    let loader = MemoryFiles::default()
        .with("unknown.yml", "Resource: {}\n")
        .with("sentinel.yml", "Resources:\n  A:\n    Type: '|nope|'\n");

    for url in ["unknown.yml", "sentinel.yml"] {
        let err = cfsync::commands::render_template(&loader, url, std::path::Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, cfsync::Error::Template(_)), "{url}: {err}");
    }
}

#[tokio::test]
async fn validate_sends_transformed_template() {
    let provider = Arc::new(FakeProvider::new());
    let services = common::services(
        provider.clone(),
        MemoryFiles::default().with("t.yml", "Resources:\n  A:\n    Type: X\n"),
    );

    cfsync::commands::validate_template(&services, "t.yml", std::path::Path::new("."))
        .await
        .unwrap();

    assert_eq!(provider.calls(), vec!["validate"]);
}
