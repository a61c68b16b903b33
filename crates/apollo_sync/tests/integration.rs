//! Integration tests for the client against an in-memory config service.

use apollo_protocol::{
    decode_notifications, encode_notifications, signature, ApolloConfig, Notification,
    AUTHORIZATION_HEADER, TIMESTAMP_HEADER,
};
use apollo_sync::{
    ApolloClient, ChangeAction, ChangeEvent, ChangeListener, ClientConfig, ClientRegistry,
    ConfigTransport, HttpResponse, PollOutcome, SyncError, SyncResult, WorkerState,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use url::Url;

const BASE: &str = "http://apollo.test";

#[derive(Default)]
struct Namespace {
    release: u64,
    notification_id: i64,
    configurations: BTreeMap<String, String>,
}

/// A config service holding namespaces in memory.
#[derive(Default)]
struct FakeApollo {
    namespaces: Mutex<HashMap<String, Namespace>>,
    offline: Mutex<bool>,
    secret: Option<String>,
    fetches: Mutex<Vec<String>>,
}

impl FakeApollo {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_secret(secret: &str) -> Arc<Self> {
        Arc::new(Self {
            secret: Some(secret.to_string()),
            ..Self::default()
        })
    }

    /// Publishes a new release of `namespace`.
    fn publish(&self, namespace: &str, pairs: &[(&str, &str)]) {
        let mut namespaces = self.namespaces.lock();
        let entry = namespaces.entry(namespace.to_string()).or_default();
        entry.release += 1;
        entry.notification_id += 1;
        entry.configurations = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    fn fetch_count(&self, namespace: &str) -> usize {
        self.fetches.lock().iter().filter(|ns| *ns == namespace).count()
    }

    fn authorized(&self, url: &str, headers: &[(String, String)]) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        let header = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        let (Some(auth), Some(timestamp)) = (header(AUTHORIZATION_HEADER), header(TIMESTAMP_HEADER))
        else {
            return false;
        };
        let path = url.strip_prefix(BASE).unwrap_or(url);
        let expected = signature(&timestamp, path, secret).unwrap();
        auth.ends_with(&format!(":{}", expected))
    }

    fn serve_config(&self, namespace: &str) -> HttpResponse {
        self.fetches.lock().push(namespace.to_string());
        let namespaces = self.namespaces.lock();
        match namespaces.get(namespace) {
            Some(ns) => {
                let mut snapshot =
                    ApolloConfig::new(format!("release-{}", ns.release), ns.configurations.clone());
                snapshot.namespace_name = Some(namespace.to_string());
                HttpResponse::ok(snapshot.to_json().unwrap())
            }
            None => HttpResponse::new(404, ""),
        }
    }

    fn serve_notifications(&self, url: &Url) -> HttpResponse {
        let Some((_, list)) = url.query_pairs().find(|(k, _)| k == "notifications") else {
            return HttpResponse::new(400, "");
        };
        let known = decode_notifications(&list).unwrap();

        let namespaces = self.namespaces.lock();
        let changed: Vec<Notification> = known
            .iter()
            .filter_map(|n| {
                let ns = namespaces.get(&n.namespace_name)?;
                (ns.notification_id > n.notification_id)
                    .then(|| Notification::new(n.namespace_name.clone(), ns.notification_id))
            })
            .collect();

        if changed.is_empty() {
            HttpResponse::not_modified()
        } else {
            HttpResponse::ok(encode_notifications(&changed).unwrap())
        }
    }
}

/// Routes client requests to a shared [`FakeApollo`].
struct InMemoryTransport {
    server: Arc<FakeApollo>,
}

impl ConfigTransport for InMemoryTransport {
    fn get(
        &self,
        url: &str,
        _timeout: Duration,
        headers: &[(String, String)],
    ) -> SyncResult<HttpResponse> {
        if *self.server.offline.lock() {
            return Err(SyncError::transport_retryable("connection refused"));
        }
        if !self.server.authorized(url, headers) {
            return Ok(HttpResponse::new(401, ""));
        }

        let parsed = Url::parse(url).map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        let segments: Vec<_> = parsed.path_segments().map(|s| s.collect()).unwrap_or_default();

        match segments.as_slice() {
            ["configs", _app, _cluster, namespace] => Ok(self.server.serve_config(namespace)),
            ["notifications", "v2"] => Ok(self.server.serve_notifications(&parsed)),
            _ => Ok(HttpResponse::new(404, "")),
        }
    }
}

fn transport(server: &Arc<FakeApollo>) -> Arc<dyn ConfigTransport> {
    Arc::new(InMemoryTransport {
        server: Arc::clone(server),
    })
}

/// Collects every delivered event.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<ChangeEvent>>,
}

impl ChangeListener for Recorder {
    fn on_change(&self, event: &ChangeEvent) {
        self.events.lock().push(event.clone());
    }
}

impl Recorder {
    fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }
}

fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn config(cache_dir: &std::path::Path) -> ClientConfig {
    ClientConfig::new(BASE, "demo-service")
        .with_cache_dir(cache_dir)
        .with_ip("10.0.0.8")
        .with_scheduled_update(false)
}

#[test]
fn bootstrap_emits_no_events_and_scheduled_pull_does() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("a", "1"), ("b", "2")]);

    let recorder = Arc::new(Recorder::default());
    let config = config(dir.path())
        .with_scheduled_update(true)
        .with_sync_interval(Duration::from_millis(20))
        .with_shared_listener(recorder.clone());

    let client = ApolloClient::new(config, transport(&server)).unwrap();
    assert_eq!(client.get_value("b", "x"), "2");
    assert!(recorder.events().is_empty());

    client.start().unwrap();
    server.publish("application", &[("a", "1"), ("b", "3"), ("c", "4")]);

    assert!(wait_until(|| recorder.events().len() == 2));
    assert_eq!(
        recorder.events(),
        vec![
            ChangeEvent::update("application", "b", "2", "3"),
            ChangeEvent::add("application", "c", "4"),
        ]
    );
    assert_eq!(client.get_value("c", "x"), "4");
    client.stop();
}

#[test]
fn offline_start_serves_disk_cache() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("timeout", "100")]);

    {
        let client = ApolloClient::new(config(dir.path()), transport(&server)).unwrap();
        assert_eq!(client.get_value("timeout", "0"), "100");
    }

    server.set_offline(true);
    let recorder = Arc::new(Recorder::default());
    let client = ApolloClient::new(
        config(dir.path()).with_shared_listener(recorder.clone()),
        transport(&server),
    )
    .unwrap();

    assert_eq!(client.get_value("timeout", "0"), "100");
    assert_eq!(client.release_key("application").as_deref(), Some("release-1"));
    assert!(recorder.events().is_empty());

    let stats = client.stats();
    assert_eq!(stats.cache_fallbacks, 1);
    assert_eq!(stats.fetch_failures, 1);
}

#[test]
fn offline_without_cache_returns_defaults() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.set_offline(true);

    let client = ApolloClient::new(config(dir.path()), transport(&server)).unwrap();
    assert_eq!(client.get_value("timeout", "30"), "30");
    assert!(client.get_config("application").is_none());
    assert!(client.namespaces().is_empty());
}

#[test]
fn recovery_after_outage_emits_changes() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("mode", "blue")]);

    let recorder = Arc::new(Recorder::default());
    let client = ApolloClient::new(
        config(dir.path()).with_shared_listener(recorder.clone()),
        transport(&server),
    )
    .unwrap();

    server.set_offline(true);
    let report = client.sync_now();
    assert_eq!(report.from_cache, vec!["application"]);
    assert!(recorder.events().is_empty());

    server.set_offline(false);
    server.publish("application", &[("mode", "green")]);
    let report = client.sync_now();
    assert_eq!(report.updated, vec!["application"]);
    assert_eq!(
        recorder.events(),
        vec![ChangeEvent::update("application", "mode", "blue", "green")]
    );

    let cached = std::fs::read_to_string(
        dir.path()
            .join("demo-service_configuration_application.txt"),
    )
    .unwrap();
    assert!(cached.contains("green"));
}

#[test]
fn long_poll_drains_every_notified_namespace() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("k", "1")]);
    server.publish("db.yml", &[("url", "jdbc:a")]);

    let recorder = Arc::new(Recorder::default());
    let client = ApolloClient::new(
        config(dir.path())
            .with_namespaces(["application", "db.yml"])
            .with_shared_listener(recorder.clone()),
        transport(&server),
    )
    .unwrap();

    // The client has never seen a notification id, so both are reported.
    let first = client.watcher().poll_once().unwrap();
    assert_eq!(
        first,
        PollOutcome::Changed(vec!["application".into(), "db.yml".into()])
    );
    assert!(recorder.events().is_empty());
    assert_eq!(client.watcher().poll_once().unwrap(), PollOutcome::NoChange);

    server.publish("application", &[("k", "2")]);
    server.publish("db.yml", &[("url", "jdbc:b")]);
    let outcome = client.watcher().poll_once().unwrap();
    assert_eq!(
        outcome,
        PollOutcome::Changed(vec!["application".into(), "db.yml".into()])
    );

    assert_eq!(client.get_value_in("application", "k", ""), "2");
    assert_eq!(client.get_value_in("db.yml", "url", ""), "jdbc:b");
    assert_eq!(
        recorder.events(),
        vec![
            ChangeEvent::update("application", "k", "1", "2"),
            ChangeEvent::update("db.yml", "url", "jdbc:a", "jdbc:b"),
        ]
    );
}

#[test]
fn long_poll_loop_applies_changes() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("flag", "off")]);

    let recorder = Arc::new(Recorder::default());
    let client = ApolloClient::new(
        config(dir.path())
            .with_long_poll_update(true)
            .with_poll_interval(Duration::from_millis(10))
            .with_shared_listener(recorder.clone()),
        transport(&server),
    )
    .unwrap();
    client.start().unwrap();
    assert_eq!(client.watcher().state(), WorkerState::Running);

    server.publish("application", &[("flag", "on"), ("extra", "1")]);
    assert!(wait_until(|| client.get_value("flag", "") == "on"));
    assert!(wait_until(|| recorder.events().len() == 2));

    let actions: Vec<_> = recorder.events().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![ChangeAction::Update, ChangeAction::Add]);
    client.stop();
}

#[test]
fn stopped_client_stops_applying_changes() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("v", "1")]);

    let client = ApolloClient::new(
        config(dir.path())
            .with_scheduled_update(true)
            .with_sync_interval(Duration::from_millis(10)),
        transport(&server),
    )
    .unwrap();
    client.start().unwrap();
    client.stop();

    // Let an in-flight cycle, if any, finish.
    thread::sleep(Duration::from_millis(50));
    let fetches = server.fetch_count("application");
    server.publish("application", &[("v", "2")]);
    thread::sleep(Duration::from_millis(100));

    assert_eq!(server.fetch_count("application"), fetches);
    assert_eq!(client.get_value("v", ""), "1");
    assert!(client.start().is_err());
}

#[test]
fn panicking_listener_does_not_stop_delivery() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("a", "1")]);

    let recorder = Arc::new(Recorder::default());
    let client = ApolloClient::new(
        config(dir.path())
            .with_listener(|e: &ChangeEvent| {
                if e.action == ChangeAction::Update {
                    panic!("listener bug");
                }
            })
            .with_shared_listener(recorder.clone()),
        transport(&server),
    )
    .unwrap();

    server.publish("application", &[("a", "2")]);
    client.sync_now();
    server.publish("application", &[("a", "3")]);
    client.sync_now();

    assert_eq!(recorder.events().len(), 2);
    assert_eq!(client.get_value("a", ""), "3");
    assert_eq!(client.stats().failed_deliveries, 2);
}

#[test]
fn signed_requests_are_accepted() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::with_secret("s3cret");
    server.publish("application", &[("a", "1")]);

    let client = ApolloClient::new(
        config(dir.path()).with_secret("s3cret"),
        transport(&server),
    )
    .unwrap();
    assert_eq!(client.get_value("a", ""), "1");
    assert_eq!(
        client.watcher().poll_once().unwrap(),
        PollOutcome::Changed(vec!["application".into()])
    );

    let unsigned = ApolloClient::new(config(dir.path()), transport(&server)).unwrap();
    assert!(unsigned.stats().fetch_failures >= 1);
    assert!(matches!(
        unsigned.watcher().poll_once(),
        Err(SyncError::HttpStatus(401))
    ));
}

#[test]
fn registry_shares_clients_per_config() {
    let dir = tempdir().unwrap();
    let server = FakeApollo::new();
    server.publish("application", &[("a", "1")]);
    let registry = ClientRegistry::new();

    let first = registry
        .get_or_create(config(dir.path()), transport(&server))
        .unwrap();
    let second = registry
        .get_or_create(config(dir.path()), transport(&server))
        .unwrap();
    let other = registry
        .get_or_create(config(dir.path()).with_cluster("beta"), transport(&server))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.len(), 2);
    assert_eq!(server.fetch_count("application"), 2);
}
