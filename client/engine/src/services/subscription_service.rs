use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::engine::EngineEvent;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{CancelHandle, Collection, Filter, Record, RemoteStoreGateway};
use crate::models::{HistoryRecord, SubjectAverage};
use crate::store::{ScopedResource, StateDelta, StateStore};

/// A logical subscription slot. At most one live remote subscription may
/// exist per scope at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionScope {
    SelfHistory,
    AdminViewedStudentHistory,
}

impl SubscriptionScope {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionScope::SelfHistory => "self-history",
            SubscriptionScope::AdminViewedStudentHistory => "admin-viewed-student-history",
        }
    }
}

/// Decoded snapshot (or terminal error) delivered by a remote listener,
/// tagged with the generation it was issued under.
#[derive(Debug, Clone)]
pub struct SnapshotEvent {
    pub scope: SubscriptionScope,
    pub generation: u64,
    pub outcome: Result<Vec<HistoryRecord>, String>,
}

struct ActiveSubscription {
    generation: u64,
    handle: CancelHandle,
}

/// Disposes a subscription when its owning mode scope is torn down.
pub struct SubscriptionGuard {
    scope: SubscriptionScope,
    handle: CancelHandle,
}

impl ScopedResource for SubscriptionGuard {
    fn dispose(&mut self) {
        if !self.handle.is_cancelled() {
            tracing::info!(scope = self.scope.as_str(), "subscription cancelled by scope disposal");
        }
        self.handle.cancel();
    }
}

/// Owns zero-or-one live remote subscription per scope, with
/// replace-not-stack semantics: subscribing a scope first cancels any
/// existing handle for it.
pub struct SubscriptionManager {
    gateway: Arc<dyn RemoteStoreGateway>,
    events: UnboundedSender<EngineEvent>,
    active: HashMap<SubscriptionScope, ActiveSubscription>,
    next_generation: u64,
}

impl SubscriptionManager {
    pub fn new(gateway: Arc<dyn RemoteStoreGateway>, events: UnboundedSender<EngineEvent>) -> Self {
        Self {
            gateway,
            events,
            active: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Starts (or replaces) the history subscription for `scope`, filtered
    /// to `user_id`. Cancel-then-create: there is no window in which two
    /// handles for the scope both deliver.
    pub async fn subscribe_history(
        &mut self,
        scope: SubscriptionScope,
        user_id: &str,
    ) -> EngineResult<()> {
        self.cancel(scope);

        self.next_generation += 1;
        let generation = self.next_generation;
        let events = self.events.clone();
        let callback: crate::gateway::SnapshotCallback = Box::new(move |outcome| {
            let outcome = match outcome {
                Ok(records) => decode_history(&records),
                Err(err) => Err(err.to_string()),
            };
            let _ = events.send(EngineEvent::Snapshot(SnapshotEvent {
                scope,
                generation,
                outcome,
            }));
        });

        let handle = self
            .gateway
            .subscribe(
                Collection::ExamHistory,
                Filter::field_eq("user_id", user_id),
                callback,
            )
            .await
            .map_err(EngineError::remote)?;

        tracing::info!(
            scope = scope.as_str(),
            generation,
            user_id,
            "subscription started"
        );
        self.active
            .insert(scope, ActiveSubscription { generation, handle });
        Ok(())
    }

    /// Synchronous, idempotent cancel. Stale snapshots that were already in
    /// flight are discarded by the generation check in `apply_snapshot`.
    pub fn cancel(&mut self, scope: SubscriptionScope) {
        if let Some(previous) = self.active.remove(&scope) {
            previous.handle.cancel();
            tracing::info!(
                scope = scope.as_str(),
                generation = previous.generation,
                "subscription cancelled"
            );
        }
    }

    pub fn cancel_all(&mut self) {
        let scopes: Vec<SubscriptionScope> = self.active.keys().copied().collect();
        for scope in scopes {
            self.cancel(scope);
        }
    }

    pub fn is_live(&self, scope: SubscriptionScope) -> bool {
        self.active
            .get(&scope)
            .map(|s| !s.handle.is_cancelled())
            .unwrap_or(false)
    }

    /// A disposable guard for binding the scope's subscription to a store
    /// mode. Only meaningful while the subscription is live.
    pub fn guard(&self, scope: SubscriptionScope) -> Option<Box<dyn ScopedResource>> {
        self.active.get(&scope).map(|live| {
            Box::new(SubscriptionGuard {
                scope,
                handle: live.handle.clone(),
            }) as Box<dyn ScopedResource>
        })
    }

    /// Applies a snapshot event to the store: sorts date-descending,
    /// recomputes the per-subject aggregate, and issues one state update.
    /// Stale or post-cancel events are dropped.
    pub fn apply_snapshot(&mut self, store: &mut StateStore, event: SnapshotEvent) {
        let Some(live) = self.active.get(&event.scope) else {
            tracing::debug!(scope = event.scope.as_str(), "snapshot for inactive scope ignored");
            return;
        };
        if live.generation != event.generation || live.handle.is_cancelled() {
            tracing::debug!(
                scope = event.scope.as_str(),
                live = live.generation,
                event = event.generation,
                "stale snapshot discarded"
            );
            return;
        }

        match event.outcome {
            Err(message) => {
                // terminal for this scope: treat the handle as cancelled
                tracing::warn!(scope = event.scope.as_str(), error = %message, "subscription failed");
                if let Some(failed) = self.active.remove(&event.scope) {
                    failed.handle.cancel();
                }
                store.update(StateDelta::new().notice(Some(format!(
                    "Live updates for {} are unavailable: {}",
                    event.scope.as_str(),
                    message
                ))));
            }
            Ok(mut records) => {
                records.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
                let averages = compute_subject_averages(&records);
                let delta = match event.scope {
                    SubscriptionScope::SelfHistory => {
                        // authoritative snapshot wins over optimistic edits;
                        // refresh the denormalized copy on the user as well
                        let user = store.state().current_user.clone().map(|mut user| {
                            user.exam_history = records.clone();
                            user
                        });
                        let delta = StateDelta::new()
                            .exam_history(records)
                            .subject_averages(averages);
                        match user {
                            Some(user) => delta.user(Some(user)),
                            None => delta,
                        }
                    }
                    SubscriptionScope::AdminViewedStudentHistory => StateDelta::new()
                        .viewed_student_history(records)
                        .viewed_subject_averages(averages),
                };
                store.update(delta);
            }
        }
    }
}

fn decode_history(records: &[Record]) -> Result<Vec<HistoryRecord>, String> {
    records
        .iter()
        .map(|record| record.decode::<HistoryRecord>().map_err(|e| e.to_string()))
        .collect()
}

/// Mean score per subject, sorted by subject name for a stable radar
/// summary.
pub fn compute_subject_averages(records: &[HistoryRecord]) -> Vec<SubjectAverage> {
    let mut totals: HashMap<&str, (u64, u32)> = HashMap::new();
    for record in records {
        let entry = totals.entry(record.subject.as_str()).or_insert((0, 0));
        entry.0 += u64::from(record.score);
        entry.1 += 1;
    }

    let mut averages: Vec<SubjectAverage> = totals
        .into_iter()
        .map(|(subject, (sum, attempts))| SubjectAverage {
            subject: subject.to_string(),
            average_score: sum as f64 / f64::from(attempts),
            attempts,
        })
        .collect();
    averages.sort_by(|a, b| a.subject.cmp(&b.subject));
    averages
}
