use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::Value;

use super::{CancelHandle, Collection, Filter, Record, RemoteStoreGateway, SnapshotCallback};

/// In-process document store used by the demo binary and the integration
/// tests. Mutations fan snapshots out to matching subscriptions
/// synchronously, which makes subscription-driven flows deterministic.
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
    next_subscription_id: AtomicU64,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<Collection, BTreeMap<String, Value>>,
    subscriptions: HashMap<Collection, Vec<Subscription>>,
    /// Collections currently simulating an outage (test hook).
    failing: HashSet<Collection>,
}

struct Subscription {
    filter: Filter,
    callback: Arc<SnapshotCallback>,
    cancelled: Arc<AtomicBool>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// Inserts a document without notifying subscriptions. Test and demo
    /// fixture setup only.
    pub fn seed(&self, collection: Collection, id: &str, mut data: Value) {
        if let Some(object) = data.as_object_mut() {
            object.insert("id".to_string(), Value::String(id.to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner
            .collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Toggles a simulated outage: every operation on the collection fails
    /// and live subscriptions receive a terminal error on the next fan-out.
    pub fn set_failing(&self, collection: Collection, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if failing {
            inner.failing.insert(collection);
        } else {
            inner.failing.remove(&collection);
        }
    }

    /// Number of subscriptions that have not been cancelled.
    pub fn live_subscription_count(&self, collection: Collection) -> usize {
        let mut inner = self.inner.lock().unwrap();
        if let Some(subs) = inner.subscriptions.get_mut(&collection) {
            subs.retain(|s| !s.cancelled.load(Ordering::SeqCst));
            subs.len()
        } else {
            0
        }
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .collections
            .get(&collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn check_available(inner: &Inner, collection: Collection) -> anyhow::Result<()> {
        if inner.failing.contains(&collection) {
            return Err(anyhow!("simulated outage on collection '{}'", collection));
        }
        Ok(())
    }

    fn records_matching(inner: &Inner, collection: Collection, filter: &Filter) -> Vec<Record> {
        inner
            .collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| filter.matches(data))
                    .map(|(id, data)| Record {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delivers fresh snapshots to every live subscription on `collection`.
    /// Callbacks run outside the lock.
    fn fan_out(&self, collection: Collection) {
        let deliveries: Vec<(Arc<SnapshotCallback>, anyhow::Result<Vec<Record>>)> = {
            let mut inner = self.inner.lock().unwrap();
            let failing = inner.failing.contains(&collection);
            let subs = match inner.subscriptions.get_mut(&collection) {
                Some(subs) => {
                    subs.retain(|s| !s.cancelled.load(Ordering::SeqCst));
                    subs.iter()
                        .map(|s| (s.callback.clone(), s.filter.clone()))
                        .collect::<Vec<_>>()
                }
                None => Vec::new(),
            };
            let inner = &*inner;
            subs.into_iter()
                .map(|(callback, filter)| {
                    let outcome = if failing {
                        Err(anyhow!("simulated outage on collection '{}'", collection))
                    } else {
                        Ok(Self::records_matching(inner, collection, &filter))
                    };
                    (callback, outcome)
                })
                .collect()
        };

        for (callback, outcome) in deliveries {
            callback(outcome);
        }
    }
}

#[async_trait]
impl RemoteStoreGateway for InMemoryGateway {
    async fn read_all(&self, collection: Collection) -> anyhow::Result<Vec<Record>> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner, collection)
            .with_context(|| format!("read_all on '{}'", collection))?;
        Ok(Self::records_matching(&inner, collection, &Filter::all()))
    }

    async fn read_one(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Record>> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner, collection)
            .with_context(|| format!("read_one on '{}'", collection))?;
        Ok(inner
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Record {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn create(&self, collection: Collection, mut data: Value) -> anyhow::Result<String> {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            Self::check_available(&inner, collection)
                .with_context(|| format!("create on '{}'", collection))?;

            // respect an engine-assigned id, otherwise mint one
            let id = data
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            if let Some(object) = data.as_object_mut() {
                object.insert("id".to_string(), Value::String(id.clone()));
            }
            inner
                .collections
                .entry(collection)
                .or_default()
                .insert(id.clone(), data);
            id
        };

        self.fan_out(collection);
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> anyhow::Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            Self::check_available(&inner, collection)
                .with_context(|| format!("update on '{}'", collection))?;
            let docs = inner.collections.entry(collection).or_default();
            let existing = docs
                .get_mut(id)
                .ok_or_else(|| anyhow!("document '{}' not found in '{}'", id, collection))?;
            match (existing.as_object_mut(), patch.as_object()) {
                // shallow key-wise patch
                (Some(target), Some(fields)) => {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
                _ => *existing = patch,
            }
        }

        self.fan_out(collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> anyhow::Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            Self::check_available(&inner, collection)
                .with_context(|| format!("delete on '{}'", collection))?;
            if let Some(docs) = inner.collections.get_mut(&collection) {
                docs.remove(id);
            }
        }

        self.fan_out(collection);
        Ok(())
    }

    async fn query_where(
        &self,
        collection: Collection,
        field: &str,
        value: Value,
    ) -> anyhow::Result<Vec<Record>> {
        let inner = self.inner.lock().unwrap();
        Self::check_available(&inner, collection)
            .with_context(|| format!("query_where on '{}'", collection))?;
        Ok(Self::records_matching(
            &inner,
            collection,
            &Filter::field_eq(field, value),
        ))
    }

    async fn subscribe(
        &self,
        collection: Collection,
        filter: Filter,
        on_change: SnapshotCallback,
    ) -> anyhow::Result<CancelHandle> {
        let callback = Arc::new(on_change);
        let cancelled = Arc::new(AtomicBool::new(false));
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);

        let initial = {
            let mut inner = self.inner.lock().unwrap();
            Self::check_available(&inner, collection)
                .with_context(|| format!("subscribe on '{}'", collection))?;
            let initial = Self::records_matching(&inner, collection, &filter);
            inner
                .subscriptions
                .entry(collection)
                .or_default()
                .push(Subscription {
                    filter,
                    callback: callback.clone(),
                    cancelled: cancelled.clone(),
                });
            initial
        };

        tracing::debug!(collection = %collection, subscription = id, "subscription registered");

        // initial snapshot, delivered before the handle is returned
        callback(Ok(initial));

        let flag = cancelled.clone();
        Ok(CancelHandle::new(move || {
            flag.store(true, Ordering::SeqCst);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn snapshots_sink() -> (SnapshotCallback, Arc<StdMutex<Vec<anyhow::Result<Vec<Record>>>>>) {
        let sink: Arc<StdMutex<Vec<anyhow::Result<Vec<Record>>>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let captured = sink.clone();
        let callback: SnapshotCallback = Box::new(move |outcome| {
            captured.lock().unwrap().push(outcome);
        });
        (callback, sink)
    }

    #[tokio::test]
    async fn create_assigns_id_and_injects_it() {
        let gateway = InMemoryGateway::new();
        let id = gateway
            .create(Collection::Subjects, json!({ "name": "Math" }))
            .await
            .unwrap();

        let record = gateway
            .read_one(Collection::Subjects, &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.data["id"], json!(id));
        assert_eq!(record.data["name"], json!("Math"));
    }

    #[tokio::test]
    async fn query_where_filters_on_field() {
        let gateway = InMemoryGateway::new();
        gateway.seed(Collection::Questions, "q1", json!({ "category_id": "c1" }));
        gateway.seed(Collection::Questions, "q2", json!({ "category_id": "c2" }));

        let hits = gateway
            .query_where(Collection::Questions, "category_id", json!("c1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "q1");
    }

    #[tokio::test]
    async fn update_applies_shallow_patch() {
        let gateway = InMemoryGateway::new();
        gateway.seed(
            Collection::AssignmentSubmissions,
            "s1",
            json!({ "status": "draft", "score": null }),
        );
        gateway
            .update(
                Collection::AssignmentSubmissions,
                "s1",
                json!({ "status": "submitted" }),
            )
            .await
            .unwrap();

        let record = gateway
            .read_one(Collection::AssignmentSubmissions, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.data["status"], json!("submitted"));
        assert_eq!(record.data["id"], json!("s1"));
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_and_mutation_snapshots() {
        let gateway = InMemoryGateway::new();
        gateway.seed(Collection::ExamHistory, "h1", json!({ "user_id": "u1" }));

        let (callback, sink) = snapshots_sink();
        let handle = gateway
            .subscribe(
                Collection::ExamHistory,
                Filter::field_eq("user_id", "u1"),
                callback,
            )
            .await
            .unwrap();

        gateway
            .create(Collection::ExamHistory, json!({ "user_id": "u1" }))
            .await
            .unwrap();
        // other users' records do not grow the snapshot
        gateway
            .create(Collection::ExamHistory, json!({ "user_id": "u2" }))
            .await
            .unwrap();

        {
            let seen = sink.lock().unwrap();
            assert_eq!(seen.len(), 3);
            assert_eq!(seen[0].as_ref().unwrap().len(), 1);
            assert_eq!(seen[1].as_ref().unwrap().len(), 2);
            assert_eq!(seen[2].as_ref().unwrap().len(), 2);
        }

        handle.cancel();
        gateway
            .create(Collection::ExamHistory, json!({ "user_id": "u1" }))
            .await
            .unwrap();
        assert_eq!(sink.lock().unwrap().len(), 3);
        assert_eq!(gateway.live_subscription_count(Collection::ExamHistory), 0);
    }

    #[tokio::test]
    async fn failing_collection_errors_operations_and_snapshots() {
        let gateway = InMemoryGateway::new();
        let (callback, sink) = snapshots_sink();
        gateway
            .subscribe(Collection::ExamHistory, Filter::all(), callback)
            .await
            .unwrap();

        gateway.set_failing(Collection::ExamHistory, true);
        assert!(gateway.read_all(Collection::ExamHistory).await.is_err());

        // a mutation attempt fails, but the fan-out path still reports the
        // outage to listeners
        gateway.fan_out(Collection::ExamHistory);
        let seen = sink.lock().unwrap();
        assert!(seen.last().unwrap().is_err());
    }
}
