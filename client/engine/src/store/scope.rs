use std::collections::HashMap;

/// A cancellable resource bound to a named application mode (a running
/// timer, a live subscription). Disposal must be idempotent.
pub trait ScopedResource: Send {
    fn dispose(&mut self);
}

/// Application modes that own disposable resources. Leaving the mode
/// disposes everything acquired under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppMode {
    ExamTaking,
    AssignmentWork,
    AdminAnalytics,
}

#[derive(Default)]
pub struct ModeScopes {
    scopes: HashMap<AppMode, Vec<Box<dyn ScopedResource>>>,
}

impl ModeScopes {
    pub fn acquire(&mut self, mode: AppMode, resource: Box<dyn ScopedResource>) {
        self.scopes.entry(mode).or_default().push(resource);
    }

    pub fn dispose_mode(&mut self, mode: AppMode) {
        if let Some(mut resources) = self.scopes.remove(&mode) {
            tracing::debug!(?mode, count = resources.len(), "disposing mode scope");
            for resource in &mut resources {
                resource.dispose();
            }
        }
    }

    pub fn dispose_all(&mut self) {
        let modes: Vec<AppMode> = self.scopes.keys().copied().collect();
        for mode in modes {
            self.dispose_mode(mode);
        }
    }
}
