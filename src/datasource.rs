//! Data source instances.
//!
//! The host identifies a configured data source by `dataSourceId` and bumps
//! `updated` whenever its settings change. One [`Client`] (and therefore one
//! connection pool) is kept per data source. A request carrying a newer
//! stamp closes the old client before a new one is built from the new
//! settings.

use crate::client::{Client, RedisClient};
use crate::config::ClientConfig;
use crate::dispatch;
use crate::error::Result;
use crate::query::{DataQuery, DataResponse, QueryContext};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings of one configured data source, as sent by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceSettings {
    pub url: String,
    pub json_data: serde_json::Value,
    pub secure_json_data: serde_json::Value,
}

/// Identifies the data source a request is for.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginContext {
    pub data_source_id: i64,
    /// Settings revision; newer values replace the instance.
    pub updated: i64,
    pub settings: InstanceSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub message: String,
}

/// Builds the client for an instance.
pub type ClientFactory = dyn Fn(&ClientConfig) -> Result<Arc<dyn Client>> + Send + Sync;

struct Instance {
    updated: i64,
    client: Arc<dyn Client>,
}

pub struct Datasource {
    instances: Mutex<HashMap<i64, Instance>>,
    factory: Box<ClientFactory>,
}

impl Default for Datasource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}

impl Datasource {
    /// Instances connect to real deployments.
    pub fn new() -> Self {
        Self::with_factory(|config| {
            let client: Arc<dyn Client> = Arc::new(RedisClient::connect(config)?);
            Ok(client)
        })
    }

    pub fn with_factory(
        factory: impl Fn(&ClientConfig) -> Result<Arc<dyn Client>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// The client for `ctx`, built on first use or after a settings change.
    ///
    /// The instance map is not locked while a client is built, so a slow or
    /// unreachable data source does not hold up the others. When two
    /// requests build the same instance at once, the first one stored wins
    /// and the other client is closed.
    fn instance(&self, ctx: &PluginContext) -> Result<Arc<dyn Client>> {
        let id = ctx.data_source_id;
        if let Some(instance) = self.instances.lock().get(&id) {
            if instance.updated >= ctx.updated {
                return Ok(Arc::clone(&instance.client));
            }
        }

        let settings = &ctx.settings;
        let config =
            ClientConfig::from_settings(&settings.url, &settings.json_data, &settings.secure_json_data)?;
        let client = (self.factory)(&config)?;

        let mut instances = self.instances.lock();
        if let Some(current) = instances.get(&id) {
            if current.updated >= ctx.updated {
                let current = Arc::clone(&current.client);
                drop(instances);
                debug!(data_source = id, "instance built concurrently, dropping duplicate");
                close_client(id, client.as_ref());
                return Ok(current);
            }
        }
        let stale = instances.insert(
            id,
            Instance {
                updated: ctx.updated,
                client: Arc::clone(&client),
            },
        );
        drop(instances);

        if let Some(stale) = stale {
            info!(data_source = id, "settings changed, disposing instance");
            close_client(id, stale.client.as_ref());
        }
        info!(
            data_source = id,
            client = %config.client,
            url = %config.url,
            "instance created"
        );
        Ok(client)
    }

    /// Run every query of one request, in order. Responses are keyed by
    /// `refId`. Only a failure to get the instance fails the whole request.
    pub fn query_data(
        &self,
        ctx: &PluginContext,
        queries: &[DataQuery],
        query_ctx: &QueryContext,
    ) -> Result<BTreeMap<String, DataResponse>> {
        debug!(data_source = ctx.data_source_id, queries = queries.len(), "queryData");
        let client = self.instance(ctx)?;

        Ok(queries
            .iter()
            .map(|q| (q.ref_id.clone(), dispatch::query(q, client.as_ref(), query_ctx)))
            .collect())
    }

    /// `PING` the data source.
    pub fn check_health(&self, ctx: &PluginContext) -> HealthResult {
        let client = match self.instance(ctx) {
            Ok(client) => client,
            Err(e) => {
                return HealthResult {
                    status: HealthStatus::Error,
                    message: format!("getInstance error: {e}"),
                }
            }
        };

        match client.run_cmd("PING", &[]) {
            Ok(_) => HealthResult {
                status: HealthStatus::Ok,
                message: "Data Source is working as expected.".to_string(),
            },
            Err(e) => HealthResult {
                status: HealthStatus::Error,
                message: format!("PING command failed: {e}"),
            },
        }
    }

    /// Close and forget one instance. Returns whether it existed.
    pub fn dispose(&self, data_source_id: i64) -> bool {
        let removed = self.instances.lock().remove(&data_source_id);
        match removed {
            Some(instance) => {
                info!(data_source = data_source_id, "instance disposed");
                close_client(data_source_id, instance.client.as_ref());
                true
            }
            None => false,
        }
    }

    /// Close every instance.
    pub fn dispose_all(&self) {
        let drained: Vec<(i64, Instance)> = self.instances.lock().drain().collect();
        for (id, instance) in drained {
            close_client(id, instance.client.as_ref());
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

fn close_client(data_source_id: i64, client: &dyn Client) {
    if let Err(e) = client.close() {
        warn!(data_source = data_source_id, error = %e, "closing client failed");
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::ScriptedClient;
    use crate::error::DatasourceError;
    use crate::resp::types::RespValue;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::{Duration, Instant};

    fn context(id: i64, updated: i64) -> PluginContext {
        serde_json::from_value(json!({
            "dataSourceId": id,
            "updated": updated,
            "settings": { "url": "redis://127.0.0.1:6379", "jsonData": { "poolSize": 2 } }
        }))
        .unwrap()
    }

    /// Factory handing out the given clients in order.
    fn scripted(clients: Vec<Arc<ScriptedClient>>, built: Arc<AtomicUsize>) -> Datasource {
        let clients = Mutex::new(clients.into_iter());
        Datasource::with_factory(move |_| {
            built.fetch_add(1, Ordering::SeqCst);
            let client: Arc<dyn Client> = clients
                .lock()
                .next()
                .ok_or_else(|| DatasourceError::Config("no client left".into()))?;
            Ok(client)
        })
    }

    fn smembers(ref_id: &str) -> DataQuery {
        serde_json::from_value(json!({
            "refId": ref_id,
            "json": { "command": "smembers", "keyName": "s" }
        }))
        .unwrap()
    }

    #[test]
    fn instances_are_reused_until_settings_change() {
        let first = Arc::new(ScriptedClient::new().reply(RespValue::simple("PONG")).reply(RespValue::simple("PONG")));
        let second = Arc::new(ScriptedClient::new().reply(RespValue::simple("PONG")));
        let built = Arc::new(AtomicUsize::new(0));
        let ds = scripted(vec![first.clone(), second.clone()], built.clone());

        assert_eq!(ds.check_health(&context(1, 100)).status, HealthStatus::Ok);
        assert_eq!(ds.check_health(&context(1, 100)).status, HealthStatus::Ok);
        assert_eq!(built.load(Ordering::SeqCst), 1);

        assert_eq!(ds.check_health(&context(1, 200)).status, HealthStatus::Ok);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(first.is_closed());
        assert!(!second.is_closed());

        assert!(ds.dispose(1));
        assert!(second.is_closed());
        assert!(!ds.dispose(1));
        assert_eq!(ds.instance_count(), 0);
    }

    fn pong_client() -> Arc<ScriptedClient> {
        Arc::new(
            ScriptedClient::new()
                .reply(RespValue::simple("PONG"))
                .reply(RespValue::simple("PONG")),
        )
    }

    #[test]
    fn slow_instance_does_not_hold_up_others() {
        let ds = Arc::new(Datasource::with_factory(|config| {
            if config.url.starts_with("slow") {
                thread::sleep(Duration::from_millis(1500));
            }
            let client: Arc<dyn Client> = pong_client();
            Ok(client)
        }));

        let slow = {
            let ds = Arc::clone(&ds);
            thread::spawn(move || {
                let mut ctx = context(1, 1);
                ctx.settings.url = "slow:6379".into();
                ds.check_health(&ctx)
            })
        };
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        assert_eq!(ds.check_health(&context(2, 1)).status, HealthStatus::Ok);
        let waited = started.elapsed();
        assert!(waited < Duration::from_millis(500), "waited {waited:?}");

        assert_eq!(slow.join().unwrap().status, HealthStatus::Ok);
        assert_eq!(ds.instance_count(), 2);
    }

    #[test]
    fn concurrent_builds_keep_one_instance() {
        let both_building = Arc::new(Barrier::new(2));
        let built: Arc<Mutex<Vec<Arc<ScriptedClient>>>> = Arc::default();
        let ds = {
            let built = Arc::clone(&built);
            Arc::new(Datasource::with_factory(move |_| {
                both_building.wait();
                let client = pong_client();
                built.lock().push(Arc::clone(&client));
                let client: Arc<dyn Client> = client;
                Ok(client)
            }))
        };

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let ds = Arc::clone(&ds);
                thread::spawn(move || ds.check_health(&context(5, 1)))
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap().status, HealthStatus::Ok);
        }

        let built = built.lock();
        assert_eq!(built.len(), 2);
        assert_eq!(ds.instance_count(), 1);
        assert_eq!(built.iter().filter(|c| c.is_closed()).count(), 1);
    }

    #[test]
    fn query_data_keys_responses_by_ref_id() {
        let client = Arc::new(
            ScriptedClient::new()
                .reply(crate::commands::testing::bulk_array(&["a", "b"]))
                .server_error("WRONGTYPE Operation against a key holding the wrong kind of value"),
        );
        let ds = scripted(vec![client], Arc::new(AtomicUsize::new(0)));

        let responses = ds
            .query_data(&context(7, 1), &[smembers("A"), smembers("B")], &QueryContext::new())
            .unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses["A"].frames[0].rows(), 2);
        assert_eq!(
            responses["B"].error.as_deref(),
            Some("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
    }

    #[test]
    fn health_messages() {
        let ds = scripted(
            vec![Arc::new(ScriptedClient::new().transport_error("connection reset"))],
            Arc::new(AtomicUsize::new(0)),
        );
        let health = ds.check_health(&context(1, 1));
        assert_eq!(health.status, HealthStatus::Error);
        assert!(health.message.starts_with("PING command failed: "), "{}", health.message);

        // Factory exhausted: the instance cannot be built
        let health = ds.check_health(&context(2, 1));
        assert_eq!(health.status, HealthStatus::Error);
        assert!(health.message.starts_with("getInstance error: "), "{}", health.message);

        assert_eq!(
            serde_json::to_value(HealthResult {
                status: HealthStatus::Ok,
                message: "m".into()
            })
            .unwrap(),
            json!({ "status": "OK", "message": "m" })
        );
    }

    #[test]
    fn non_pong_reply_is_healthy() {
        let ds = scripted(
            vec![Arc::new(ScriptedClient::new().reply("hello"))],
            Arc::new(AtomicUsize::new(0)),
        );
        let health = ds.check_health(&context(1, 1));
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.message, "Data Source is working as expected.");
    }

    #[test]
    fn bad_settings_fail_the_request() {
        let ds = scripted(vec![], Arc::new(AtomicUsize::new(0)));
        let ctx: PluginContext = serde_json::from_value(json!({
            "dataSourceId": 3,
            "settings": { "url": "x", "jsonData": { "poolSize": "many" } }
        }))
        .unwrap();
        assert!(ds.query_data(&ctx, &[smembers("A")], &QueryContext::new()).is_err());
    }
}
