//! chopd - development reverse proxy for Chopin framework apps.
//!
//! Sits between the developer's client and the target application server:
//! serializes mutating requests, injects the dev identity and callback
//! headers, and records every mutating exchange for inspection at
//! `/_chopin/logs`.

use std::env;
use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use chopd::spawn::TargetProcess;
use chopd::state::AppState;
use chopd_core::{config, ChopinConfig};

/// chopd - Chopin development proxy
#[derive(Parser, Debug)]
#[command(name = "chopd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// `[proxyPort] [targetPort]`, or a subcommand such as `init`
    #[arg(value_name = "ARG")]
    args: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// What the positional tokens ask for.
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    /// Run the proxy, with optional port overrides.
    Serve {
        proxy_port: Option<u16>,
        target_port: Option<u16>,
    },
    /// Scaffold `chopin.config.json` and `.gitignore`.
    Init,
}

/// Interprets positional tokens: a leading non-numeric token is a
/// subcommand, numeric tokens are `[proxyPort] [targetPort]`.
fn parse_invocation(tokens: &[String]) -> Result<Invocation> {
    let Some(first) = tokens.first() else {
        return Ok(Invocation::Serve {
            proxy_port: None,
            target_port: None,
        });
    };

    if let Ok(proxy_port) = first.parse::<u16>() {
        let target_port = match tokens.get(1) {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .with_context(|| format!("invalid target port {raw:?}"))?,
            ),
            None => None,
        };
        if tokens.len() > 2 {
            bail!("unexpected argument {:?}", tokens[2]);
        }
        return Ok(Invocation::Serve {
            proxy_port: Some(proxy_port),
            target_port,
        });
    }

    match first.as_str() {
        "init" => Ok(Invocation::Init),
        other => bail!("unknown subcommand {other:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let invocation = parse_invocation(&cli.args)?;

    if invocation == Invocation::Init {
        let cwd = env::current_dir().context("failed to resolve working directory")?;
        let path = config::init_project(&cwd)?;
        println!("Created {}", path.display());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cwd = env::current_dir().context("failed to resolve working directory")?;
    let mut config = ChopinConfig::load_or_default(&cwd)?;
    if let Invocation::Serve {
        proxy_port,
        target_port,
    } = invocation
    {
        config.apply_overrides(proxy_port, target_port);
    }
    config.validate()?;

    let target = TargetProcess::spawn(&config).context("failed to start target process")?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.proxy_port));
    let target_port = config.target_port;
    let state = AppState::new(config);
    let app = chopd::server::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(proxy = %addr, target = target_port, "chopd proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("proxy server error")?;

    if let Some(target) = target {
        info!("stopping target process");
        target.stop().await;
    }

    info!("shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_args_serves_with_defaults() {
        assert_eq!(
            parse_invocation(&[]).unwrap(),
            Invocation::Serve {
                proxy_port: None,
                target_port: None
            }
        );
    }

    #[test]
    fn numeric_tokens_are_port_overrides() {
        assert_eq!(
            parse_invocation(&tokens(&["4100"])).unwrap(),
            Invocation::Serve {
                proxy_port: Some(4100),
                target_port: None
            }
        );
        assert_eq!(
            parse_invocation(&tokens(&["4100", "3100"])).unwrap(),
            Invocation::Serve {
                proxy_port: Some(4100),
                target_port: Some(3100)
            }
        );
    }

    #[test]
    fn init_is_recognized() {
        assert_eq!(parse_invocation(&tokens(&["init"])).unwrap(), Invocation::Init);
    }

    #[test]
    fn unknown_subcommand_errors() {
        assert!(parse_invocation(&tokens(&["frobnicate"])).is_err());
    }

    #[test]
    fn malformed_target_port_errors() {
        assert!(parse_invocation(&tokens(&["4100", "nope"])).is_err());
        assert!(parse_invocation(&tokens(&["4100", "3100", "extra"])).is_err());
    }
}
