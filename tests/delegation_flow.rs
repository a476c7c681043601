use anyhow::Result;
use async_trait::async_trait;
use cni_libkv::core::{ContainerContext, DelegationResult, Delegator};
use cni_libkv::utils::error::ErrorCategory;
use cni_libkv::{DelegateError, DelegationEngine, DirScratchStore, StoreRegistry};
use httpmock::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

const LIST: &str = r#"[{"type":"bridge","bridge":"cni0","ipam":{"type":"host-local","subnet":"10.1.0.0/16"}},{"type":"loopback"}]"#;

#[derive(Clone, Default)]
struct FakePlugins {
    calls: Arc<Mutex<Vec<String>>>,
    fail_add: Option<String>,
}

impl FakePlugins {
    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Delegator for FakePlugins {
    async fn attach(
        &self,
        plugin: &str,
        _config: &[u8],
        context: &ContainerContext,
    ) -> cni_libkv::Result<DelegationResult> {
        self.calls.lock().await.push(format!("ADD {}", plugin));
        if self.fail_add.as_deref() == Some(plugin) {
            return Err(DelegateError::PluginFailed {
                plugin: plugin.to_string(),
                code: None,
                message: "address already in use".to_string(),
            });
        }
        let result = serde_json::json!({
            "cniVersion": "0.3.1",
            "plugin": plugin,
            "container": context.container_id,
        });
        DelegationResult::from_bytes(serde_json::to_vec(&result)?)
    }

    async fn detach(
        &self,
        plugin: &str,
        _config: &[u8],
        _context: &ContainerContext,
    ) -> cni_libkv::Result<()> {
        self.calls.lock().await.push(format!("DEL {}", plugin));
        Ok(())
    }
}

fn etcd_config(server: &MockServer) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "cniVersion": "0.3.1",
        "name": "remote-net",
        "type": "libkv",
        "storeBackend": "etcd",
        "uri": server.address().to_string(),
        "basePath": "cni/",
    }))
    .unwrap()
}

fn mock_version(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/version");
        then.status(200)
            .json_body(serde_json::json!({"etcdserver": "3.4.0", "etcdcluster": "3.4.0"}));
    });
}

fn mock_value<'a>(server: &'a MockServer, container_id: &str, value: &str) -> httpmock::Mock<'a> {
    let path = format!("/v2/keys/cni/{}", container_id);
    let body = serde_json::json!({
        "action": "get",
        "node": {"key": format!("/cni/{}", container_id), "value": value, "modifiedIndex": 4},
    });
    server.mock(move |when, then| {
        when.method(GET).path(path);
        then.status(200).json_body(body);
    })
}

fn engine(state: &TempDir, plugins: FakePlugins) -> DelegationEngine<DirScratchStore, FakePlugins> {
    DelegationEngine::new(
        StoreRegistry::builtin(),
        DirScratchStore::new(state.path().join("libkv")),
        plugins,
    )
}

#[tokio::test]
async fn test_setup_delegates_in_order_and_returns_first_result() -> Result<()> {
    let server = MockServer::start();
    mock_version(&server);
    let kv = mock_value(&server, "testcontainer", LIST);

    let state = TempDir::new()?;
    let engine = engine(&state, FakePlugins::default());
    let context = ContainerContext::new("testcontainer");

    let result = engine.on_attach(&context, &etcd_config(&server)).await?;

    kv.assert();
    assert_eq!(engine.delegator().calls().await, vec!["ADD bridge", "ADD loopback"]);
    let json = result.to_json()?;
    assert_eq!(json["plugin"], "bridge");
    assert_eq!(json["container"], "testcontainer");
    Ok(())
}

#[tokio::test]
async fn test_missing_key_writes_no_scratch_record() -> Result<()> {
    let server = MockServer::start();
    mock_version(&server);
    server.mock(|when, then| {
        when.method(GET).path("/v2/keys/cni/unknown");
        then.status(404)
            .json_body(serde_json::json!({"errorCode": 100, "message": "Key not found"}));
    });

    let state = TempDir::new()?;
    let engine = engine(&state, FakePlugins::default());

    let err = engine
        .on_attach(&ContainerContext::new("unknown"), &etcd_config(&server))
        .await
        .unwrap_err();

    assert!(matches!(err, DelegateError::KeyNotFound { ref key } if key == "cni/unknown"));
    assert!(!engine.scratch().record_path("unknown").exists());
    assert!(engine.delegator().calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_teardown_uses_scratch_and_only_once() -> Result<()> {
    let server = MockServer::start();
    mock_version(&server);
    let mut kv = mock_value(&server, "testcontainer", LIST);

    let state = TempDir::new()?;
    let engine = engine(&state, FakePlugins::default());
    let context = ContainerContext::new("testcontainer");

    engine.on_attach(&context, &etcd_config(&server)).await?;
    assert_eq!(
        std::fs::read(engine.scratch().record_path("testcontainer"))?,
        LIST.as_bytes()
    );

    // Teardown must not depend on the store's current contents.
    kv.delete();
    mock_value(&server, "testcontainer", r#"[{"type":"macvlan"}]"#);

    engine.on_detach(&context).await?;
    assert_eq!(
        engine.delegator().calls().await,
        vec!["ADD bridge", "ADD loopback", "DEL bridge", "DEL loopback"]
    );
    assert!(!engine.scratch().record_path("testcontainer").exists());

    let err = engine.on_detach(&context).await.unwrap_err();
    assert!(matches!(err, DelegateError::ScratchNotFound { .. }));
    assert_eq!(engine.delegator().calls().await.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_empty_list_is_parse_error() -> Result<()> {
    let server = MockServer::start();
    mock_version(&server);
    mock_value(&server, "empty", "[]");

    let state = TempDir::new()?;
    let engine = engine(&state, FakePlugins::default());

    let err = engine
        .on_attach(&ContainerContext::new("empty"), &etcd_config(&server))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Parse);
    assert!(!engine.scratch().record_path("empty").exists());
    assert!(engine.delegator().calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_second_entry_failure_keeps_first_attached() -> Result<()> {
    let server = MockServer::start();
    mock_version(&server);
    mock_value(&server, "c2", LIST);

    let state = TempDir::new()?;
    let plugins = FakePlugins {
        fail_add: Some("loopback".to_string()),
        ..Default::default()
    };
    let engine = engine(&state, plugins);
    let context = ContainerContext::new("c2");

    let err = engine
        .on_attach(&context, &etcd_config(&server))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Delegation);

    // The bridge attachment is not reverted; the persisted record still
    // lets a later teardown release it.
    assert_eq!(engine.delegator().calls().await, vec!["ADD bridge", "ADD loopback"]);
    assert!(engine.scratch().record_path("c2").exists());

    engine.on_detach(&context).await?;
    assert_eq!(
        engine.delegator().calls().await[2..],
        ["DEL bridge".to_string(), "DEL loopback".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_consul_backend_end_to_end() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/status/leader");
        then.status(200).body("\"10.0.0.1:8300\"");
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/kv/networks/pod-7").query_param_exists("raw");
        then.status(200).body(LIST);
    });

    let config = serde_json::to_vec(&serde_json::json!({
        "type": "libkv",
        "storeBackend": "consul",
        "uri": format!("http://{}", server.address()),
        "basePath": "networks",
    }))?;

    let state = TempDir::new()?;
    let engine = engine(&state, FakePlugins::default());
    let result = engine
        .on_attach(&ContainerContext::new("pod-7"), &config)
        .await?;

    assert_eq!(result.to_json()?["plugin"], "bridge");
    Ok(())
}

#[tokio::test]
async fn test_unreachable_store_is_connect_error() -> Result<()> {
    let state = TempDir::new()?;
    let engine = engine(&state, FakePlugins::default());
    let config = br#"{"storeBackend":"etcd","uri":"127.0.0.1:9","storeConfig":{"connectionTimeout":"1s"}}"#;

    let err = engine
        .on_attach(&ContainerContext::new("c3"), config)
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Connect);
    assert!(!engine.scratch().record_path("c3").exists());
    Ok(())
}
