use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hydration::{HttpInstanceDirectory, Resolution};
use probe::{CapabilityCheck, HttpCapabilityCheck, Prober};
use runtime::{NotificationSink, TracingSink};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::{JoinHandle, LocalSet};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod shell;

use config::{ShellConfig, load_instances};
use shell::{ViewerShell, render_views};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Probe configured imagery instances and hydrate viewer deep links"
)]
struct Args {
    /// JSON file with the configured instances (default: $VIEWER_INSTANCES
    /// or config/instances.json)
    #[arg(long)]
    instances: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every instance, hydrate the URL's fragment, then hydrate one
    /// fragment per stdin line. Published views are printed as JSON lines.
    Run {
        /// Page URL (or bare fragment) to hydrate at startup.
        #[arg(long)]
        url: Option<String>,

        /// Do not read navigation fragments from stdin.
        #[arg(long, default_value_t = false)]
        no_stdin: bool,
    },
    /// Run one probe cycle and print the verified catalog.
    Probe,
    /// Decode a URL or fragment and print the deep-link request.
    Decode {
        /// URL containing `#`, or a bare fragment.
        input: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let local = LocalSet::new();
    if let Err(err) = local.run_until(run(args)).await {
        error!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum ShellError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("http client setup failed: {0}")]
    Http(String),
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("output serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

async fn run(args: Args) -> Result<(), ShellError> {
    let instances_path = args
        .instances
        .or_else(|| std::env::var("VIEWER_INSTANCES").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config/instances.json"));

    match args.command {
        Command::Decode { input } => decode(&input).await,
        Command::Probe => {
            let settings = ShellConfig::from_env();
            let configured = load_instances(&instances_path).await?;
            probe_only(configured, &settings).await
        }
        Command::Run { url, no_stdin } => {
            let settings = ShellConfig::from_env();
            let configured = load_instances(&instances_path).await?;
            info!(
                instances = configured.len(),
                path = %instances_path.display(),
                "configured instances loaded"
            );
            serve(configured, &settings, url, !no_stdin).await
        }
    }
}

async fn decode(input: &str) -> Result<(), ShellError> {
    let request = if input.contains('#') {
        fragment::decode_url(input)
    } else {
        fragment::decode(input)
    };
    let mut out = tokio::io::stdout();
    out.write_all(serde_json::to_string_pretty(&request)?.as_bytes())
        .await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

fn capability_check(settings: &ShellConfig) -> Result<Arc<dyn CapabilityCheck>, ShellError> {
    let check = HttpCapabilityCheck::with_timeout(settings.http_timeout)
        .map_err(|e| ShellError::Http(e.to_string()))?;
    Ok(Arc::new(check))
}

async fn probe_only(
    configured: Vec<catalog::Instance>,
    settings: &ShellConfig,
) -> Result<(), ShellError> {
    let notifier: Arc<dyn NotificationSink> = Arc::new(TracingSink);
    let prober = Prober::new(capability_check(settings)?, notifier);

    // A cycle fault has already been reported through the sink.
    let Ok(report) = prober.probe(configured).completion.await else {
        return Ok(());
    };
    for outcome in report.failed() {
        if let Some(err) = outcome.error() {
            warn!(instance = %outcome.instance().name, "unavailable: {err}");
        }
    }

    let names: Vec<&str> = report.catalog.names().collect();
    let mut out = tokio::io::stdout();
    out.write_all(serde_json::to_string(&names)?.as_bytes())
        .await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

async fn serve(
    configured: Vec<catalog::Instance>,
    settings: &ShellConfig,
    url: Option<String>,
    read_stdin: bool,
) -> Result<(), ShellError> {
    if settings.credentials.is_none() {
        info!("no client credentials configured; instance-id deep links will be denied");
    }
    let directory = HttpInstanceDirectory::with_timeout(
        settings.http_timeout,
        settings.endpoints.clone(),
        settings.credentials.clone(),
    )
    .map_err(|e| ShellError::Http(e.to_string()))?;

    let shell = ViewerShell::new(
        configured,
        capability_check(settings)?,
        Arc::new(directory),
        Arc::new(TracingSink),
    );
    let renderer = tokio::task::spawn_local(render_views(shell.views(), tokio::io::stdout()));

    let startup = url.as_deref().map(|url| match url.split_once('#') {
        Some((_, fragment)) => fragment,
        // A page URL without a fragment carries no deep link.
        None if url.contains("://") => "",
        None => url,
    });
    let (_report, resolution) = shell.start(startup).await;
    log_resolution("startup", &resolution);

    if read_stdin {
        let mut pending: Vec<JoinHandle<()>> = Vec::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let fragment = line.trim().to_string();
            if fragment.is_empty() {
                continue;
            }
            // Navigations may overlap; only the newest one may publish.
            let orchestrator = shell.orchestrator();
            pending.push(tokio::task::spawn_local(async move {
                let resolution = orchestrator.hydrate_fragment(&fragment).await;
                log_resolution("navigation", &resolution);
            }));
        }
        for task in pending {
            if let Err(err) = task.await {
                error!("navigation task failed: {err}");
            }
        }
    }

    drop(shell);
    match renderer.await {
        Ok(result) => result?,
        Err(err) => error!("renderer task failed: {err}"),
    }
    Ok(())
}

fn log_resolution(stage: &str, resolution: &Resolution) {
    match resolution {
        Resolution::Idle => info!(stage, "no deep link to hydrate"),
        Resolution::Hydrated(view) => {
            info!(stage, resolution = %view.resolution, instance = %view.active_layer.name, "hydrated")
        }
        Resolution::Located(location) => {
            info!(stage, lat = location.lat, lng = location.lng, "map moved; no instance")
        }
        Resolution::Rejected(reason) => warn!(stage, "rejected: {reason}"),
        Resolution::Superseded(id) => info!(stage, resolution = %id, "superseded by a newer link"),
    }
}
