use std::path::PathBuf;

use clap::Parser;
use dnsrelay::config::AppConfig;
use dnsrelay::rules::RuleList;
use dnsrelay::supervisor::Supervisor;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Rule-driven DNS forwarding proxy.
#[derive(Debug, Parser)]
#[command(name = "dnsrelay")]
struct Cli {
    /// Directory containing options.json and rules.json.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Register as a system service. Not implemented by this binary; logged
    /// and exits, matching the core's "only their interfaces are named"
    /// treatment of process lifecycle.
    #[arg(long)]
    install: bool,

    /// Unregister the system service.
    #[arg(long)]
    uninstall: bool,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    if cli.install {
        init_tracing(None);
        info!("--install is a no-op in this build; service registration is out of scope");
        return Ok(());
    }
    if cli.uninstall {
        init_tracing(None);
        info!("--uninstall is a no-op in this build; service registration is out of scope");
        return Ok(());
    }

    let options_path = cli.config_dir.join("options.json");
    let rules_path = cli.config_dir.join("rules.json");

    let config = AppConfig::load_or_default(&options_path);
    init_tracing(config.log_level.as_deref());

    let rules = RuleList::load_or_empty(&rules_path);
    info!(rules = rules.len(), "loaded rule list");

    let supervisor = Supervisor::start(&config, rules).await?;

    let mut sighup = signal_hangup();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                supervisor.shutdown();
                break;
            }
            _ = sighup.recv() => {
                info!("sighup received, reloading rules");
                supervisor.reload(&rules_path);
            }
        }
    }

    Ok(())
}

fn init_tracing(log_level: Option<&str>) {
    let filter = log_level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(unix)]
fn signal_hangup() -> tokio::signal::unix::Signal {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .expect("failed to install SIGHUP handler")
}

#[cfg(not(unix))]
fn signal_hangup() -> impl NeverFiring {
    struct Never;
    impl Never {
        async fn recv(&mut self) -> Option<()> {
            std::future::pending().await
        }
    }
    trait NeverFiring {
        async fn recv(&mut self) -> Option<()>;
    }
    impl NeverFiring for Never {
        async fn recv(&mut self) -> Option<()> {
            std::future::pending().await
        }
    }
    Never
}
