use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use catalog::{Catalog, CatalogError, Instance};
use futures_util::FutureExt as _;
use runtime::{
    BoxFuture, FirstSettled, NotificationKind, NotificationSink, StateReader, StateWriter,
    settle, state_channel,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::check::{CapabilityCheck, ProbeFailure};

/// Result of one capability check.
///
/// Only the [`Prober`] creates outcomes, so a successful outcome is proof that
/// the instance passed its check.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    instance: Instance,
    result: Result<(), ProbeFailure>,
}

impl ProbeOutcome {
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn result(&self) -> &Result<(), ProbeFailure> {
        &self.result
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&ProbeFailure> {
        self.result.as_ref().err()
    }
}

/// A probe cycle failed as a whole (not a single instance).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("a capability check panicked")]
    Panicked,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub catalog: Arc<Catalog>,
}

impl ProbeReport {
    pub fn verified_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}

/// A running probe cycle.
///
/// `completion` drives every check; `first_settled` only resolves while
/// `completion` is being polled (or after it was dropped).
pub struct ProbeCycle<'a> {
    pub first_settled: FirstSettled,
    pub completion: BoxFuture<'a, Result<ProbeReport, ProbeError>>,
}

/// Read handles on the prober's state.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    catalog: StateReader<Arc<Catalog>>,
    ready: StateReader<bool>,
}

impl CatalogHandle {
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.get()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Resolves once the loading state is over.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.clone();
        ready.wait_until(|ready| *ready).await;
    }

    pub fn catalog_reader(&self) -> StateReader<Arc<Catalog>> {
        self.catalog.clone()
    }
}

/// Owner of the verified catalog and the ready flag.
///
/// The prober holds the only writers for both; everyone else reads through a
/// [`CatalogHandle`].
pub struct Prober {
    check: Arc<dyn CapabilityCheck>,
    notifier: Arc<dyn NotificationSink>,
    catalog: StateWriter<Arc<Catalog>>,
    ready: StateWriter<bool>,
    // Held for a whole cycle and for each admission so catalog writes never
    // overlap.
    cycle: Mutex<()>,
}

impl Prober {
    pub fn new(check: Arc<dyn CapabilityCheck>, notifier: Arc<dyn NotificationSink>) -> Self {
        let (catalog, _) = state_channel(Arc::new(Catalog::empty()));
        let (ready, _) = state_channel(false);
        Self {
            check,
            notifier,
            catalog,
            ready,
            cycle: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> CatalogHandle {
        CatalogHandle {
            catalog: self.catalog.reader(),
            ready: self.ready.reader(),
        }
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.get()
    }

    /// Check a single instance.
    pub async fn probe_one(&self, instance: &Instance) -> ProbeOutcome {
        let result = self.check.check(instance).await;
        if let Err(err) = &result {
            warn!(instance = %instance.name, "capability check failed: {err}");
        }
        ProbeOutcome {
            instance: instance.clone(),
            result,
        }
    }

    /// Start a probe cycle over the configured instances.
    ///
    /// The catalog is replaced once, after every check has settled. A fault
    /// of the cycle itself is reported through the notification sink; the
    /// ready flag is set either way.
    pub fn probe(&self, configured: Vec<Instance>) -> ProbeCycle<'_> {
        let tasks: Vec<BoxFuture<'_, ProbeOutcome>> = configured
            .iter()
            .cloned()
            .map(|instance| {
                let task: BoxFuture<'_, ProbeOutcome> =
                    Box::pin(async move { self.probe_one(&instance).await });
                task
            })
            .collect();
        let (first_settled, all) = settle(tasks);

        let completion = Box::pin(async move {
            let _cycle = self.cycle.lock().await;
            debug!(instances = all.len(), "probe cycle started");

            let settled = AssertUnwindSafe(all.wait_each(|_, outcome| {
                if self.ready.set_if_changed(true) {
                    debug!(instance = %outcome.instance.name, "first probe settled");
                }
            }))
            .catch_unwind()
            .await;

            let result = match settled {
                Ok(outcomes) => self.replace_catalog(&configured, outcomes),
                Err(_) => Err(ProbeError::Panicked),
            };

            self.ready.set_if_changed(true);
            if let Err(err) = &result {
                error!("probe cycle failed: {err}");
                self.notifier
                    .notify(&format!("An error occurred: {err}"), NotificationKind::Error);
            }
            result
        });

        ProbeCycle {
            first_settled,
            completion,
        }
    }

    fn replace_catalog(
        &self,
        configured: &[Instance],
        outcomes: Vec<ProbeOutcome>,
    ) -> Result<ProbeReport, ProbeError> {
        let verified = outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.instance.name.as_str());
        let catalog = Arc::new(Catalog::from_verified(configured, verified)?);
        self.catalog.set(catalog.clone());

        info!(
            verified = catalog.len(),
            configured = configured.len(),
            "probe cycle settled"
        );
        Ok(ProbeReport { outcomes, catalog })
    }

    /// Add an instance that passed [`Prober::probe_one`] to the catalog.
    ///
    /// Waits for a running probe cycle to write its catalog first, then asks
    /// `still_wanted` whether the admission should happen at all; `Ok(None)`
    /// means it was dropped. A same-named entry is replaced in place,
    /// otherwise the instance is appended. A failed outcome leaves the catalog
    /// untouched.
    pub async fn admit(
        &self,
        outcome: ProbeOutcome,
        still_wanted: impl FnOnce() -> bool,
    ) -> Result<Option<Arc<Catalog>>, ProbeFailure> {
        let ProbeOutcome { instance, result } = outcome;
        result?;

        let _cycle = self.cycle.lock().await;
        if !still_wanted() {
            debug!(instance = %instance.name, "admission no longer wanted");
            return Ok(None);
        }
        let name = instance.name.clone();
        self.catalog
            .update(|catalog| *catalog = Arc::new(catalog.with_instance(instance)));
        info!(instance = %name, "instance admitted to catalog");
        Ok(Some(self.catalog.get()))
    }
}
