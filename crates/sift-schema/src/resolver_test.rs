//! Registry resolution tests

use serde_json::json;

use super::*;

fn key(s: &str) -> SchemaKey {
    SchemaKey::parse(s).unwrap()
}

#[tokio::test]
async fn static_registry_finds_and_misses() {
    let registry = StaticRegistry::new().with_schema(
        "iglu:com.acme/thing/jsonschema/1-0-0",
        json!({"type": "object"}),
    );

    match registry.resolve(&key("iglu:com.acme/thing/jsonschema/1-0-0")).await {
        Resolution::Found(doc) => assert_eq!(doc["type"], "object"),
        other => panic!("expected Found, got {:?}", other),
    }

    assert!(matches!(
        registry.resolve(&key("iglu:com.acme/other/jsonschema/1-0-0")).await,
        Resolution::NotFound
    ));
}

#[tokio::test]
async fn dir_registry_reads_layout() {
    let dir = tempfile::tempdir().unwrap();
    let schema_dir = dir.path().join("schemas/com.acme/thing/jsonschema");
    std::fs::create_dir_all(&schema_dir).unwrap();
    std::fs::write(
        schema_dir.join("1-0-0"),
        serde_json::to_vec(&json!({"type": "object", "required": ["id"]})).unwrap(),
    )
    .unwrap();

    let registry = DirRegistry::new(dir.path());

    match registry.resolve(&key("iglu:com.acme/thing/jsonschema/1-0-0")).await {
        Resolution::Found(doc) => assert_eq!(doc["required"][0], "id"),
        other => panic!("expected Found, got {:?}", other),
    }

    assert!(matches!(
        registry.resolve(&key("iglu:com.acme/thing/jsonschema/2-0-0")).await,
        Resolution::NotFound
    ));
}

#[tokio::test]
async fn dir_registry_flags_invalid_documents() {
    let dir = tempfile::tempdir().unwrap();
    let schema_dir = dir.path().join("schemas/com.acme/bad/jsonschema");
    std::fs::create_dir_all(&schema_dir).unwrap();
    std::fs::write(schema_dir.join("1-0-0"), b"{not json").unwrap();

    let registry = DirRegistry::new(dir.path());
    assert!(matches!(
        registry.resolve(&key("iglu:com.acme/bad/jsonschema/1-0-0")).await,
        Resolution::TransportError(_)
    ));
}

#[tokio::test]
async fn chain_prefers_first_found() {
    let first = StaticRegistry::new().with_schema(
        "iglu:com.acme/thing/jsonschema/1-0-0",
        json!({"from": "first"}),
    );
    let second = StaticRegistry::new().with_schema(
        "iglu:com.acme/thing/jsonschema/1-0-0",
        json!({"from": "second"}),
    );

    let chain = ResolverChain::new(vec![Box::new(first), Box::new(second)]);
    match chain.resolve(&key("iglu:com.acme/thing/jsonschema/1-0-0")).await {
        Resolution::Found(doc) => assert_eq!(doc["from"], "first"),
        other => panic!("expected Found, got {:?}", other),
    }
}

#[tokio::test]
async fn chain_falls_through_not_found() {
    let first = StaticRegistry::new();
    let second = StaticRegistry::new().with_schema(
        "iglu:com.acme/thing/jsonschema/1-0-0",
        json!({"from": "second"}),
    );

    let chain = ResolverChain::new(vec![Box::new(first), Box::new(second)]);
    assert!(matches!(
        chain.resolve(&key("iglu:com.acme/thing/jsonschema/1-0-0")).await,
        Resolution::Found(_)
    ));

    assert!(matches!(
        chain.resolve(&key("iglu:com.acme/missing/jsonschema/1-0-0")).await,
        Resolution::NotFound
    ));
}

struct AlwaysFailing;

#[async_trait::async_trait]
impl SchemaResolver for AlwaysFailing {
    async fn resolve(&self, _key: &SchemaKey) -> Resolution {
        Resolution::TransportError("connection refused".to_string())
    }
}

#[tokio::test]
async fn chain_reports_transport_error_over_not_found() {
    let chain = ResolverChain::new(vec![Box::new(AlwaysFailing), Box::new(StaticRegistry::new())]);
    assert!(matches!(
        chain.resolve(&key("iglu:com.acme/thing/jsonschema/1-0-0")).await,
        Resolution::TransportError(_)
    ));
}
