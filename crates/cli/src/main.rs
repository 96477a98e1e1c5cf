mod args;
mod exit_codes;
mod key;
mod listen;
mod send;

use std::sync::Arc;

use clap::Parser;
use pw_client::{PushApi, RestPushClient};
use tracing_subscriber::EnvFilter;

use args::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let resolved = match key::resolve(cli.key.as_deref(), cli.key_file.as_deref()) {
        Ok(k) => k,
        Err(e) => {
            eprintln!("{e:#}");
            return exit_codes::NO_KEY;
        }
    };
    let Some(api_key) = resolved else {
        eprintln!(
            "no API key: set {}, or pass --key / --key-file",
            key::KEY_ENV
        );
        return exit_codes::NO_KEY;
    };

    let api: Arc<dyn PushApi> = match RestPushClient::new(&api_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("{e}");
            return exit_codes::NO_KEY;
        }
    };

    match cli.command {
        Command::Send {
            title,
            body,
            url,
            device,
            file,
        } => {
            send::run(
                api,
                send::SendOpts {
                    title,
                    body,
                    url,
                    device,
                    file,
                    quiet: cli.quiet,
                },
            )
            .await
        }
        Command::Listen {
            echo,
            exec,
            exec_simple,
            throttle_count,
            throttle_seconds,
            device,
            list_devices,
        } => {
            listen::run(
                api,
                listen::ListenOpts {
                    key: api_key,
                    echo,
                    exec,
                    exec_simple,
                    throttle_count,
                    throttle_seconds,
                    device,
                    list_devices,
                },
            )
            .await
        }
    }
}

/// Level flags beat `RUST_LOG`; without a flag, `RUST_LOG` beats the
/// default of warnings only.
fn init_tracing(cli: &Cli) {
    let directive = if cli.debug {
        Some("debug")
    } else if cli.verbose {
        Some("info")
    } else if cli.quiet {
        Some("error")
    } else {
        None
    };

    let filter = match directive {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
