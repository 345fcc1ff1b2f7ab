use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use offline_sync::format::{activation_summary, prefetch_summary};
use offline_sync::{
    ActivationOutcome, AppConfig, Baseline, CachePartition, CacheStorage, Command, Deployment,
    DiskCacheStorage, EventOutcome, FetchOutcome, HttpFetcher, Method, Request, Synchronizer,
    WorkerControl, WorkerEvent, dispatch, format_bytes,
};

fn print_usage() {
    eprintln!("Usage: offline-sync [OPTIONS] --deployment <FILE> <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Stage the application shell");
    eprintln!("  activate            Reconcile the live cache with the deployment");
    eprintln!("  fetch <URL>         Answer a request the way a controlled page would see it");
    eprintln!("  message <CMD>       Send skipWaiting or downloadOffline");
    eprintln!("  status              Show partitions and the recorded manifest");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      Config file (default: <config dir>/offline-sync/config.toml)");
    eprintln!("  -d, --deployment <FILE>  Deployment JSON with resources and core lists");
    eprintln!("  -X, --method <METHOD>    Request method for fetch (default: GET)");
    eprintln!("  -h, --help               Show this help");
}

/// Reports lifecycle signals through the log, since a CLI has no clients to claim.
struct LogControl;

impl WorkerControl for LogControl {
    fn skip_waiting(&self) {
        log::info!("Requested immediate activation");
    }

    fn claim_clients(&self) {
        log::info!("Claimed clients");
    }
}

enum Action {
    Event(WorkerEvent),
    Status,
}

struct Args {
    config: PathBuf,
    deployment: PathBuf,
    action: Action,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("offline-sync")
        .join("config.toml")
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!();
    print_usage();
    std::process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(0);
    }

    let mut config = default_config_path();
    let mut deployment = None;
    let mut method = Method::Get;
    let mut positional = Vec::new();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                config = iter
                    .next()
                    .map_or_else(|| fail("--config requires a value"), PathBuf::from);
            }
            "-d" | "--deployment" => {
                deployment = Some(
                    iter.next()
                        .map_or_else(|| fail("--deployment requires a value"), PathBuf::from),
                );
            }
            "-X" | "--method" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fail("--method requires a value"));
                method = value.parse().unwrap_or(Method::Get);
            }
            _ => positional.push(arg),
        }
    }

    let deployment = deployment.unwrap_or_else(|| fail("--deployment is required"));
    let mut positional = positional.into_iter();
    let command = positional
        .next()
        .unwrap_or_else(|| fail("missing command"));

    let action = match command.as_str() {
        "install" => Action::Event(WorkerEvent::Install),
        "activate" => Action::Event(WorkerEvent::Activate),
        "fetch" => {
            let url = positional
                .next()
                .unwrap_or_else(|| fail("fetch requires a URL"));
            Action::Event(WorkerEvent::Fetch(Request::new(method, url)))
        }
        "message" => {
            let data = positional
                .next()
                .unwrap_or_else(|| fail("message requires a command"));
            Action::Event(WorkerEvent::Message(data))
        }
        "status" => Action::Status,
        other => fail(&format!("unknown command {other:?}")),
    };

    Args {
        config,
        deployment,
        action,
    }
}

async fn print_status<F: offline_sync::Fetcher, C: WorkerControl>(
    sync: &Synchronizer<DiskCacheStorage, F, C>,
) -> offline_sync::Result<()> {
    let storage = sync.storage();
    println!("Cache directory: {}", storage.root().display());
    for name in storage.names().await? {
        let partition = storage.open(&name).await?;
        let mut bytes = 0u64;
        let keys = partition.keys().await?;
        for url in &keys {
            if let Some(response) = partition.get(url).await? {
                bytes += response.body.len() as u64;
            }
        }
        println!("  {name}: {} entries, {}", keys.len(), format_bytes(bytes));
    }

    let current = &sync.deployment().resources;
    match sync.baseline().await? {
        Baseline::FreshInstall => println!("No manifest recorded yet"),
        Baseline::Upgrade(recorded) => {
            let changed = current
                .keys()
                .filter(|key| !current.is_unchanged_since(&recorded, key))
                .count();
            println!(
                "Recorded manifest: {} resources, {changed} new or changed in this deployment",
                recorded.len()
            );
        }
    }
    Ok(())
}

async fn report(outcome: EventOutcome) -> offline_sync::Result<()> {
    match outcome {
        EventOutcome::Installed(count) => println!("Staged {count} shell files"),
        EventOutcome::Activated(ActivationOutcome::Activated(stats)) => {
            println!("Activated ({})", activation_summary(&stats));
        }
        EventOutcome::Activated(ActivationOutcome::Reset { reason }) => {
            println!("Activation failed, all caches were reset: {reason}");
        }
        EventOutcome::Fetched(FetchOutcome::Passthrough) => {
            println!("Not managed; the request goes to the network untouched");
        }
        EventOutcome::Fetched(FetchOutcome::Respond(response)) => {
            println!("HTTP {}", response.status);
            for (name, value) in &response.headers {
                println!("{name}: {value}");
            }
            println!();
            println!("({})", format_bytes(response.body.len() as u64));
        }
        EventOutcome::Commanded(command, task) => match task {
            // The process exits on return, so the background download is awaited here.
            Some(handle) => match handle.await {
                Ok(result) => println!("{command}: {}", prefetch_summary(&result?)),
                Err(e) => log::error!("{command} task failed: {e}"),
            },
            None => println!("{command}: sent"),
        },
        EventOutcome::Ignored => println!("Unknown message ignored"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> offline_sync::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let config = AppConfig::load(&args.config)?;
    let deployment = Deployment::load(&args.deployment)?;
    log::debug!(
        "Loaded deployment with {} resources, {} shell files",
        deployment.resources.len(),
        deployment.core.len()
    );

    let storage = DiskCacheStorage::new(&config.storage.cache_dir);
    let fetcher = HttpFetcher::with_defaults()?;
    let sync = Arc::new(Synchronizer::with_control(
        config.sync,
        deployment,
        storage,
        fetcher,
        LogControl,
    )?);

    let event = match args.action {
        Action::Status => return print_status(&*sync).await,
        Action::Event(event) => event,
    };
    if let WorkerEvent::Message(data) = &event
        && Command::parse(data).is_none()
    {
        log::warn!("{data:?} is not a known command");
    }

    let outcome = dispatch(&sync, event).await?;
    report(outcome).await
}
