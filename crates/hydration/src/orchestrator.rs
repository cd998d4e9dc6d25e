use std::sync::Arc;

use catalog::Instance;
use foundation::{MapLocation, ResolutionCounter, ResolutionId};
use fragment::DeepLinkRequest;
use probe::{CatalogHandle, ProbeFailure, Prober};
use runtime::{NotificationKind, NotificationSink, StateReader, StateWriter, state_channel};
use tracing::{debug, info, warn};

use crate::directory::{DirectoryError, InstanceDirectory};
use crate::view::SelectedView;

/// Message shown whenever a deep link names an instance the user cannot use.
pub const ACCESS_DENIED_MESSAGE: &str = "You don't have access to this instance.";

/// Why a deep link could not be hydrated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("instance {0:?} is not in the user's instance list")]
    NotInDirectory(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    CapabilityCheck(#[from] ProbeFailure),
}

impl RejectReason {
    /// What the user is told. Every reason reads as "access denied".
    pub fn user_message(&self) -> &'static str {
        ACCESS_DENIED_MESSAGE
    }
}

/// State of the most recent hydration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum HydrationPhase {
    Idle,
    Resolving(ResolutionId),
    Hydrated(ResolutionId),
    Rejected(ResolutionId, RejectReason),
}

/// How one call to [`Orchestrator::hydrate`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Nothing to resolve; no state was touched.
    Idle,
    /// No instance resolved, but the link moved the map.
    Located(MapLocation),
    Hydrated(Arc<SelectedView>),
    Rejected(RejectReason),
    /// A newer attempt started while this one was in flight; it wrote nothing.
    Superseded(ResolutionId),
}

/// Read handles on the published view.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    view: StateReader<Option<Arc<SelectedView>>>,
    location: StateReader<Option<MapLocation>>,
    phase: StateReader<HydrationPhase>,
}

impl ViewHandle {
    pub fn view(&self) -> Option<Arc<SelectedView>> {
        self.view.get()
    }

    /// Map location published by a link that resolved no instance.
    pub fn location(&self) -> Option<MapLocation> {
        self.location.get()
    }

    pub fn phase(&self) -> HydrationPhase {
        self.phase.get()
    }

    /// Wait for the next published view. `None` once the orchestrator is gone.
    pub async fn next_view(&mut self) -> Option<Arc<SelectedView>> {
        if !self.view.changed().await {
            return None;
        }
        self.view.get()
    }

    /// Wait for the next location-only update. `None` once the orchestrator
    /// is gone.
    pub async fn next_location(&mut self) -> Option<MapLocation> {
        if !self.location.changed().await {
            return None;
        }
        self.location.get()
    }
}

/// Resolves deep-link requests into the published [`SelectedView`].
///
/// Holds the only writer for the view. Catalog growth goes through
/// [`Prober::admit`], so the prober stays the only catalog writer.
pub struct Orchestrator {
    prober: Arc<Prober>,
    catalog: CatalogHandle,
    directory: Arc<dyn InstanceDirectory>,
    notifier: Arc<dyn NotificationSink>,
    view: StateWriter<Option<Arc<SelectedView>>>,
    location: StateWriter<Option<MapLocation>>,
    phase: StateWriter<HydrationPhase>,
    attempts: ResolutionCounter,
}

impl Orchestrator {
    pub fn new(
        prober: Arc<Prober>,
        directory: Arc<dyn InstanceDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (view, _) = state_channel(None);
        let (location, _) = state_channel(None);
        let (phase, _) = state_channel(HydrationPhase::Idle);
        Self {
            catalog: prober.handle(),
            prober,
            directory,
            notifier,
            view,
            location,
            phase,
            attempts: ResolutionCounter::new(),
        }
    }

    pub fn handle(&self) -> ViewHandle {
        ViewHandle {
            view: self.view.reader(),
            location: self.location.reader(),
            phase: self.phase.reader(),
        }
    }

    pub async fn hydrate_fragment(&self, fragment: &str) -> Resolution {
        self.hydrate(fragment::decode(fragment)).await
    }

    pub async fn hydrate(&self, request: DeepLinkRequest) -> Resolution {
        if !request.has_target() {
            let Some(location) = request.location else {
                debug!("fragment names no instance; nothing to hydrate");
                return Resolution::Idle;
            };
            return self.locate(location);
        }

        let id = self.attempts.issue();
        self.phase.set(HydrationPhase::Resolving(id));

        if let Some(name) = request.datasource_name() {
            let found = self.catalog.catalog().find_by_name(name).cloned();
            if let Some(instance) = found {
                debug!(resolution = %id, instance = %name, "datasource found in catalog");
                return self.publish(id, instance, &request);
            }
        }

        let Some(instance_id) = request.target_instance_id() else {
            debug!(
                resolution = %id,
                datasource = request.datasource_name().unwrap_or_default(),
                "datasource not in catalog and no instance id"
            );
            if !self.attempts.is_latest(id) {
                return self.superseded(id);
            }
            self.phase.set(HydrationPhase::Idle);
            return match request.location {
                Some(location) => self.locate(location),
                None => Resolution::Idle,
            };
        };

        match self.discover(id, instance_id).await {
            Ok(Some(instance)) => self.publish(id, instance, &request),
            Ok(None) => self.superseded(id),
            Err(reason) => self.reject(id, reason),
        }
    }

    /// Authenticated lookup, single-instance probe and catalog admission.
    ///
    /// Returns `Ok(None)` when the attempt went stale before it could write.
    async fn discover(
        &self,
        id: ResolutionId,
        instance_id: &str,
    ) -> Result<Option<Instance>, RejectReason> {
        let instances = self.directory.list_instances().await?;
        let instance = instances
            .into_iter()
            .find(|inst| inst.id == instance_id)
            .ok_or_else(|| RejectReason::NotInDirectory(instance_id.to_string()))?;

        let outcome = self.prober.probe_one(&instance).await;
        if !self.attempts.is_latest(id) {
            return Ok(None);
        }
        let admitted = self
            .prober
            .admit(outcome, || self.attempts.is_latest(id))
            .await?;
        Ok(admitted.map(|_| instance))
    }

    fn publish(&self, id: ResolutionId, instance: Instance, request: &DeepLinkRequest) -> Resolution {
        if !self.attempts.is_latest(id) {
            return self.superseded(id);
        }
        let view = Arc::new(SelectedView::compose(id, instance, request));
        self.view.set(Some(view.clone()));
        self.phase.set(HydrationPhase::Hydrated(id));
        info!(resolution = %id, instance = %view.active_layer.name, "view hydrated");
        Resolution::Hydrated(view)
    }

    /// Move the map without touching the view or the catalog.
    fn locate(&self, location: MapLocation) -> Resolution {
        self.location.set(Some(location));
        info!(lat = location.lat, lng = location.lng, "map location published");
        Resolution::Located(location)
    }

    fn reject(&self, id: ResolutionId, reason: RejectReason) -> Resolution {
        if !self.attempts.is_latest(id) {
            return self.superseded(id);
        }
        warn!(resolution = %id, "deep link rejected: {reason}");
        self.phase.set(HydrationPhase::Rejected(id, reason.clone()));
        self.notifier
            .notify(reason.user_message(), NotificationKind::Error);
        Resolution::Rejected(reason)
    }

    fn superseded(&self, id: ResolutionId) -> Resolution {
        debug!(resolution = %id, "discarding stale resolution");
        Resolution::Superseded(id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use catalog::Instance;
    use foundation::MapLocation;
    use pretty_assertions::assert_eq;
    use probe::{CapabilityCheck, ProbeFailure, Prober};
    use runtime::{BoxFuture, NotificationKind, NotificationLog};
    use tokio::sync::Notify;

    use super::{ACCESS_DENIED_MESSAGE, HydrationPhase, Orchestrator, RejectReason, Resolution};
    use crate::directory::{DirectoryError, InstanceDirectory};

    #[derive(Default)]
    struct FakeCheck {
        failing: HashSet<String>,
        calls: AtomicUsize,
    }

    impl CapabilityCheck for FakeCheck {
        fn check<'a>(
            &'a self,
            instance: &'a Instance,
        ) -> BoxFuture<'a, Result<(), ProbeFailure>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fails = self.failing.contains(&instance.name);
            Box::pin(async move {
                if fails {
                    Err(ProbeFailure::Status(401))
                } else {
                    Ok(())
                }
            })
        }
    }

    struct FakeDirectory {
        listing: Result<Vec<Instance>, DirectoryError>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn listing(instances: Vec<Instance>) -> Self {
            Self {
                listing: Ok(instances),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: DirectoryError) -> Self {
            Self {
                listing: Err(err),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    impl InstanceDirectory for FakeDirectory {
        fn list_instances(&self) -> BoxFuture<'_, Result<Vec<Instance>, DirectoryError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                self.listing.clone()
            })
        }
    }

    struct Fixture {
        check: Arc<FakeCheck>,
        directory: Arc<FakeDirectory>,
        prober: Arc<Prober>,
        orchestrator: Arc<Orchestrator>,
        log: Arc<NotificationLog>,
    }

    fn user_instance() -> Instance {
        Instance::new("My DEM", "https://services.example.com/instances/dem-1")
            .with_metadata("url", "https://services.example.com/ogc/wms/dem-1")
    }

    async fn fixture(check: FakeCheck, directory: FakeDirectory) -> Fixture {
        let check = Arc::new(check);
        let directory = Arc::new(directory);
        let log = Arc::new(NotificationLog::new());
        let prober = Arc::new(Prober::new(check.clone(), log.clone()));
        prober
            .probe(vec![Instance::new("S2", "s2-id"), Instance::new("L8", "l8-id")])
            .completion
            .await
            .expect("probe cycle");
        let orchestrator = Arc::new(Orchestrator::new(
            prober.clone(),
            directory.clone(),
            log.clone(),
        ));
        Fixture {
            check,
            directory,
            prober,
            orchestrator,
            log,
        }
    }

    fn catalog_names(fx: &Fixture) -> Vec<String> {
        fx.prober.catalog().names().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn direct_match_hydrates_without_network() {
        let fx = fixture(FakeCheck::default(), FakeDirectory::listing(vec![])).await;
        let checks_before = fx.check.calls.load(Ordering::SeqCst);

        let res = fx
            .orchestrator
            .hydrate_fragment("#/datasource=L8&preset=CUSTOM&layers=B04,B03,B02&gain=2")
            .await;

        let Resolution::Hydrated(view) = res else {
            panic!("expected hydrated, got {res:?}");
        };
        assert_eq!(view.active_layer.name, "L8");
        assert_eq!(view.params.gain, Some(2.0));
        assert_eq!(fx.check.calls.load(Ordering::SeqCst), checks_before);
        assert_eq!(fx.directory.calls.load(Ordering::SeqCst), 0);

        let handle = fx.orchestrator.handle();
        assert_eq!(handle.view(), Some(view.clone()));
        assert_eq!(handle.phase(), HydrationPhase::Hydrated(view.resolution));
    }

    #[tokio::test]
    async fn empty_or_unresolvable_requests_stay_idle() {
        let fx = fixture(FakeCheck::default(), FakeDirectory::listing(vec![])).await;

        assert_eq!(fx.orchestrator.hydrate_fragment("").await, Resolution::Idle);
        assert_eq!(
            fx.orchestrator.hydrate_fragment("gain=1.2&gamma=0.9").await,
            Resolution::Idle
        );
        assert_eq!(
            fx.orchestrator.hydrate_fragment("datasource=MODIS").await,
            Resolution::Idle
        );

        assert_eq!(fx.orchestrator.handle().phase(), HydrationPhase::Idle);
        assert_eq!(fx.orchestrator.handle().view(), None);
        assert_eq!(fx.directory.calls.load(Ordering::SeqCst), 0);
        assert!(fx.log.is_empty());
    }

    #[tokio::test]
    async fn location_only_link_moves_map_without_view() {
        let fx = fixture(FakeCheck::default(), FakeDirectory::listing(vec![])).await;
        let mut handle = fx.orchestrator.handle();

        let res = fx
            .orchestrator
            .hydrate_fragment("lat=46.05&lng=14.5&zoom=9")
            .await;

        let expected = MapLocation::new(46.05, 14.5).with_zoom(9);
        assert_eq!(res, Resolution::Located(expected));
        assert_eq!(handle.next_location().await, Some(expected));
        assert_eq!(handle.view(), None);
        assert_eq!(handle.phase(), HydrationPhase::Idle);
        assert_eq!(catalog_names(&fx), vec!["S2", "L8"]);
        assert_eq!(fx.directory.calls.load(Ordering::SeqCst), 0);
        assert!(fx.log.is_empty());
    }

    #[tokio::test]
    async fn unresolved_datasource_still_moves_map() {
        let fx = fixture(FakeCheck::default(), FakeDirectory::listing(vec![])).await;

        let res = fx
            .orchestrator
            .hydrate_fragment("datasource=MODIS&lat=-33.9&lng=151.2")
            .await;

        assert_eq!(res, Resolution::Located(MapLocation::new(-33.9, 151.2)));
        assert_eq!(fx.orchestrator.handle().view(), None);
        assert_eq!(fx.orchestrator.handle().phase(), HydrationPhase::Idle);
    }

    #[tokio::test]
    async fn unknown_instance_id_is_rejected_without_mutation() {
        let fx = fixture(
            FakeCheck::default(),
            FakeDirectory::listing(vec![user_instance()]),
        )
        .await;
        let first = fx.orchestrator.hydrate_fragment("datasource=S2").await;
        let Resolution::Hydrated(previous) = first else {
            panic!("expected hydrated, got {first:?}");
        };

        let res = fx
            .orchestrator
            .hydrate_fragment("datasource=Nope&instanceId=someone-elses")
            .await;

        assert_eq!(
            res,
            Resolution::Rejected(RejectReason::NotInDirectory("someone-elses".into()))
        );
        assert_eq!(catalog_names(&fx), vec!["S2", "L8"]);
        assert_eq!(fx.orchestrator.handle().view(), Some(previous));

        let seen = fx.log.notifications();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, ACCESS_DENIED_MESSAGE);
        assert_eq!(seen[0].kind, NotificationKind::Error);
        assert!(matches!(
            fx.orchestrator.handle().phase(),
            HydrationPhase::Rejected(_, RejectReason::NotInDirectory(_))
        ));
    }

    #[tokio::test]
    async fn known_instance_id_is_probed_admitted_and_hydrated() {
        let fx = fixture(
            FakeCheck::default(),
            FakeDirectory::listing(vec![Instance::new("Other", "x"), user_instance()]),
        )
        .await;

        let fragment = format!(
            "instanceId={}&time=2020-01-01&evalscript=return%2520%255BB04%255D%253B",
            "https%3A%2F%2Fservices.example.com%2Finstances%2Fdem-1"
        );
        let res = fx.orchestrator.hydrate_fragment(&fragment).await;

        let Resolution::Hydrated(view) = res else {
            panic!("expected hydrated, got {res:?}");
        };
        assert_eq!(view.active_layer, user_instance());
        assert_eq!(view.params.datasource, "My DEM");
        assert_eq!(view.params.time.as_deref(), Some("2020-01-01"));
        assert_eq!(view.params.evalscript, "return [B04];");
        assert_eq!(catalog_names(&fx), vec!["S2", "L8", "My DEM"]);
        assert_eq!(fx.directory.calls.load(Ordering::SeqCst), 1);
        assert!(fx.log.is_empty());
    }

    #[tokio::test]
    async fn failed_single_probe_rejects_without_admission() {
        let mut check = FakeCheck::default();
        check.failing.insert("My DEM".to_string());
        let fx = fixture(check, FakeDirectory::listing(vec![user_instance()])).await;

        let res = fx
            .orchestrator
            .hydrate(fragment::DeepLinkRequest {
                instance_id: Some(user_instance().id),
                ..Default::default()
            })
            .await;

        assert_eq!(
            res,
            Resolution::Rejected(RejectReason::CapabilityCheck(ProbeFailure::Status(401)))
        );
        assert_eq!(catalog_names(&fx), vec!["S2", "L8"]);
        assert_eq!(fx.orchestrator.handle().view(), None);
        assert_eq!(fx.log.len(), 1);
    }

    #[tokio::test]
    async fn authentication_failure_is_access_denied() {
        let fx = fixture(
            FakeCheck::default(),
            FakeDirectory::failing(DirectoryError::Authentication("bad secret".into())),
        )
        .await;

        let res = fx.orchestrator.hydrate_fragment("instanceId=abc").await;
        assert!(matches!(res, Resolution::Rejected(RejectReason::Directory(_))));
        assert_eq!(fx.log.notifications()[0].message, ACCESS_DENIED_MESSAGE);
    }

    #[tokio::test]
    async fn later_hydration_replaces_view_wholesale() {
        let fx = fixture(FakeCheck::default(), FakeDirectory::listing(vec![])).await;

        fx.orchestrator
            .hydrate_fragment("datasource=S2&gain=2&atmFilter=DOS1&lat=1&lng=2")
            .await;
        let res = fx.orchestrator.hydrate_fragment("datasource=L8").await;
        let Resolution::Hydrated(view) = res else {
            panic!("expected hydrated, got {res:?}");
        };

        assert_eq!(view.active_layer.name, "L8");
        assert_eq!(view.params.gain, None);
        assert_eq!(view.params.atm_filter, None);
        assert_eq!(view.location, None);
    }

    #[tokio::test]
    async fn stale_discovery_does_not_overwrite_newer_view() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(
            FakeCheck::default(),
            FakeDirectory::listing(vec![user_instance()]).gated(gate.clone()),
        )
        .await;
        let mut handle = fx.orchestrator.handle();

        let slow = fx
            .orchestrator
            .hydrate_fragment("instanceId=https%3A%2F%2Fservices.example.com%2Finstances%2Fdem-1");
        let newer = async {
            // Let the slow attempt reach the directory first.
            tokio::task::yield_now().await;
            let res = fx.orchestrator.hydrate_fragment("datasource=S2").await;
            gate.notify_waiters();
            res
        };
        let (slow, newer) = tokio::join!(slow, newer);

        assert!(matches!(slow, Resolution::Superseded(_)));
        let Resolution::Hydrated(view) = newer else {
            panic!("expected hydrated, got {newer:?}");
        };
        assert_eq!(handle.view(), Some(view.clone()));
        assert_eq!(handle.next_view().await.map(|v| v.resolution), Some(view.resolution));
        assert_eq!(catalog_names(&fx), vec!["S2", "L8"]);
        assert!(fx.log.is_empty());
    }

    #[tokio::test]
    async fn stale_rejection_is_silent() {
        let gate = Arc::new(Notify::new());
        let fx = fixture(
            FakeCheck::default(),
            FakeDirectory::listing(vec![]).gated(gate.clone()),
        )
        .await;

        let slow = fx.orchestrator.hydrate_fragment("instanceId=missing");
        let newer = async {
            tokio::task::yield_now().await;
            let res = fx.orchestrator.hydrate_fragment("datasource=L8").await;
            gate.notify_waiters();
            res
        };
        let (slow, newer) = tokio::join!(slow, newer);

        assert!(matches!(slow, Resolution::Superseded(_)));
        assert!(matches!(newer, Resolution::Hydrated(_)));
        assert!(fx.log.is_empty());
        assert!(matches!(
            fx.orchestrator.handle().phase(),
            HydrationPhase::Hydrated(_)
        ));
    }
}
