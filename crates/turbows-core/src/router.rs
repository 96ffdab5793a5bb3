//! Application registry and request routing.
//!
//! Reads take a lock-free snapshot of the registered set; registration and
//! unregistration are serialized by a single write lock and publish a new
//! snapshot atomically, so a lookup never sees a half-applied change.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};
use turbows_protocol::UpgradeRequest;

use crate::application::Application;
use crate::error::DeploymentError;
use crate::path::PathMatch;

/// The set of registered applications.
#[derive(Debug, Default)]
pub struct ApplicationRouter {
    applications: ArcSwap<Vec<Arc<Application>>>,
    write_lock: Mutex<()>,
}

impl ApplicationRouter {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an application.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::EquivalentPath`] if a registered template
    /// matches exactly the same paths; the registry is left unchanged.
    pub fn register(&self, application: Application) -> Result<Arc<Application>, DeploymentError> {
        let _guard = self.write_lock.lock();
        let current = self.applications.load();

        if let Some(existing) = current
            .iter()
            .find(|existing| existing.template().is_equivalent(application.template()))
        {
            return Err(DeploymentError::EquivalentPath {
                added: application.path().to_string(),
                existing: existing.path().to_string(),
            });
        }

        let application = Arc::new(application);
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&application));
        self.applications.store(Arc::new(next));

        info!(path = application.path(), "registered application");
        Ok(application)
    }

    /// Remove a previously registered application. Returns `false` if it was
    /// not registered.
    pub fn unregister(&self, application: &Arc<Application>) -> bool {
        let _guard = self.write_lock.lock();
        let current = self.applications.load();
        if !current.iter().any(|a| Arc::ptr_eq(a, application)) {
            return false;
        }

        let next: Vec<_> = current
            .iter()
            .filter(|a| !Arc::ptr_eq(a, application))
            .cloned()
            .collect();
        self.applications.store(Arc::new(next));

        info!(path = application.path(), "unregistered application");
        true
    }

    /// Remove every application.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.applications.store(Arc::new(Vec::new()));
    }

    /// Snapshot of the registered applications.
    pub fn applications(&self) -> Arc<Vec<Arc<Application>>> {
        self.applications.load_full()
    }

    /// Number of registered applications.
    pub fn len(&self) -> usize {
        self.applications.load().len()
    }

    /// No applications are registered.
    pub fn is_empty(&self) -> bool {
        self.applications.load().is_empty()
    }

    /// Every application whose template matches `path`, most specific first.
    pub fn match_all(&self, path: &str) -> Vec<(Arc<Application>, PathMatch)> {
        let snapshot = self.applications.load();
        let mut candidates: Vec<_> = snapshot
            .iter()
            .filter_map(|app| app.matches(path).map(|m| (Arc::clone(app), m)))
            .collect();
        candidates.sort_by(|(a, _), (b, _)| a.template().specificity_cmp(b.template()));
        candidates
    }

    /// Bind `request` to the first matching application whose gate accepts it.
    ///
    /// Each candidate's path parameters are written into the request before
    /// its gate runs. On a miss the parameters are left empty.
    pub fn route(&self, request: &mut UpgradeRequest) -> Option<Arc<Application>> {
        let path = request.request_path().to_string();
        for (application, matched) in self.match_all(&path) {
            request.path_parameters = matched.parameters;
            if application.accepts(request) {
                debug!(path = %path, template = application.path(), "routed request");
                return Some(application);
            }
            debug!(path = %path, template = application.path(), "gate rejected request");
        }
        request.path_parameters.clear();
        None
    }
}
