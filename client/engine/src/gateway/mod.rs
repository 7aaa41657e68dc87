use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod memory;

pub use memory::InMemoryGateway;

/// Collections exposed by the remote document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Subjects,
    Categories,
    Questions,
    Assignments,
    AssignmentSubmissions,
    ExamHistory,
    BookmarkedQuestions,
    Users,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Subjects => "subjects",
            Collection::Categories => "categories",
            Collection::Questions => "questions",
            Collection::Assignments => "assignments",
            Collection::AssignmentSubmissions => "assignmentSubmissions",
            Collection::ExamHistory => "examHistory",
            Collection::BookmarkedQuestions => "bookmarkedQuestions",
            Collection::Users => "users",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document plus its store-assigned identifier. The id is also present in
/// the payload so decoded models carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data: Value,
}

impl Record {
    pub fn decode<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(self.data.clone())
            .with_context(|| format!("failed to decode record '{}'", self.id))
    }
}

/// Equality filter on a single field; the default matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub field: Option<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: Some((field.into(), value.into())),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        match &self.field {
            None => true,
            Some((field, value)) => data.get(field) == Some(value),
        }
    }
}

/// Snapshot delivery for a subscription. A transport failure arrives as
/// `Err` and is terminal for the subscription.
pub type SnapshotCallback = Box<dyn Fn(anyhow::Result<Vec<Record>>) + Send + Sync>;

/// Idempotent, cloneable cancel token for a subscription. The underlying
/// unsubscribe runs at most once.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Arc<dyn Fn() + Send + Sync>,
}

impl CancelHandle {
    pub fn new(on_cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            on_cancel: Arc::new(on_cancel),
        }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            (self.on_cancel)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Narrow interface to the managed document store. Implementations wrap
/// transport failures in `anyhow` contexts; the engine converts them to
/// `RemoteUnavailable`.
#[async_trait]
pub trait RemoteStoreGateway: Send + Sync {
    async fn read_all(&self, collection: Collection) -> anyhow::Result<Vec<Record>>;

    async fn read_one(&self, collection: Collection, id: &str) -> anyhow::Result<Option<Record>>;

    /// Returns the store-assigned id of the new document.
    async fn create(&self, collection: Collection, data: Value) -> anyhow::Result<String>;

    async fn update(&self, collection: Collection, id: &str, patch: Value) -> anyhow::Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> anyhow::Result<()>;

    async fn query_where(
        &self,
        collection: Collection,
        field: &str,
        value: Value,
    ) -> anyhow::Result<Vec<Record>>;

    /// Registers a snapshot listener. The callback fires with the current
    /// matching set immediately and again after every matching mutation,
    /// until the returned handle is cancelled.
    async fn subscribe(
        &self,
        collection: Collection,
        filter: Filter,
        on_change: SnapshotCallback,
    ) -> anyhow::Result<CancelHandle>;
}
