use std::sync::Arc;

use catalog::Instance;
use foundation::MapLocation;
use hydration::{InstanceDirectory, Orchestrator, Resolution, SelectedView, ViewHandle};
use probe::{CapabilityCheck, CatalogHandle, ProbeCycle, ProbeError, ProbeReport, Prober};
use runtime::NotificationSink;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Page shell: owns the prober and the orchestrator and sequences startup.
pub struct ViewerShell {
    configured: Vec<Instance>,
    prober: Arc<Prober>,
    orchestrator: Arc<Orchestrator>,
}

impl ViewerShell {
    pub fn new(
        configured: Vec<Instance>,
        check: Arc<dyn CapabilityCheck>,
        directory: Arc<dyn InstanceDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let prober = Arc::new(Prober::new(check, notifier.clone()));
        let orchestrator = Arc::new(Orchestrator::new(prober.clone(), directory, notifier));
        Self {
            configured,
            prober,
            orchestrator,
        }
    }

    pub fn catalog(&self) -> CatalogHandle {
        self.prober.handle()
    }

    pub fn views(&self) -> ViewHandle {
        self.orchestrator.handle()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// Probe the configured catalog, then hydrate the startup fragment.
    ///
    /// The ready flag flips at the first settled probe; hydration waits for
    /// the full cycle so it sees the verified catalog.
    pub async fn start(
        &self,
        fragment: Option<&str>,
    ) -> (Result<ProbeReport, ProbeError>, Resolution) {
        let ProbeCycle {
            first_settled,
            completion,
        } = self.prober.probe(self.configured.clone());
        let handle = self.prober.handle();
        let first = async move {
            first_settled.await;
            info!(ready = handle.is_ready(), "first capability check settled");
        };
        let ((), report) = tokio::join!(first, completion);

        let resolution = match fragment {
            Some(fragment) => self.orchestrator.hydrate_fragment(fragment).await,
            None => Resolution::Idle,
        };
        (report, resolution)
    }

    pub async fn navigate(&self, fragment: &str) -> Resolution {
        self.orchestrator.hydrate_fragment(fragment).await
    }
}

#[derive(Serialize)]
struct RenderedView<'a> {
    resolution: u64,
    view: &'a SelectedView,
}

#[derive(Serialize)]
struct RenderedLocation<'a> {
    location: &'a MapLocation,
}

/// One JSON line for the rendering side.
pub fn render_line(view: &SelectedView) -> serde_json::Result<String> {
    serde_json::to_string(&RenderedView {
        resolution: view.resolution.get(),
        view,
    })
}

/// One JSON line for a location-only map move.
pub fn render_location_line(location: &MapLocation) -> serde_json::Result<String> {
    serde_json::to_string(&RenderedLocation { location })
}

async fn write_line<W: AsyncWrite + Unpin>(
    out: &mut W,
    line: serde_json::Result<String>,
) -> std::io::Result<()> {
    let line = line.map_err(std::io::Error::other)?;
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Write every published view and every location-only move to `out` until
/// the orchestrator is dropped.
pub async fn render_views<W: AsyncWrite + Unpin>(
    mut views: ViewHandle,
    mut out: W,
) -> std::io::Result<()> {
    let mut locations = views.clone();
    loop {
        tokio::select! {
            view = views.next_view() => match view {
                Some(view) => write_line(&mut out, render_line(&view)).await?,
                None => break,
            },
            location = locations.next_location() => match location {
                Some(location) => {
                    write_line(&mut out, render_location_line(&location)).await?
                }
                None => break,
            },
        }
    }

    // The orchestrator is gone; flush whatever the other stream still holds.
    while let Some(view) = views.next_view().await {
        write_line(&mut out, render_line(&view)).await?;
    }
    while let Some(location) = locations.next_location().await {
        write_line(&mut out, render_location_line(&location)).await?;
    }
    Ok(())
}
