use std::error::Error;
use std::time::Duration;

use relay_core::Settings;
use tracing::{error, info};

mod cmdline;
mod pidfile;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let matches = cmdline::root_cli().get_matches();

    match matches.subcommand() {
        Some(("processor", args)) => {
            let config = cmdline::path_arg(args, cmdline::CONFIG_ARG);
            let settings = Settings::load(config.as_deref())?;

            let _pid_file = cmdline::path_arg(args, cmdline::PID_FILE_ARG)
                .and_then(|path| pidfile::PidFile::create(&path));

            relay_core::run(settings)
                .await
                .map_err(|e| format!("Error running relay: {e:?}"))?;
        }
        Some(("producer", args)) => {
            let config = cmdline::path_arg(args, cmdline::CONFIG_ARG);
            let settings = Settings::load(config.as_deref())?;
            let interval = args
                .get_one::<u64>(cmdline::INTERVAL_ARG)
                .copied()
                .map_or(relay_core::producer::DEFAULT_PUBLISH_INTERVAL, Duration::from_millis);

            relay_core::run_producer(settings, interval)
                .await
                .map_err(|e| format!("Error running producer: {e:?}"))?;
        }
        Some((name, _)) => return Err(format!("Unknown subcommand {name}").into()),
        None => return Err("No subcommand given".into()),
    }

    Ok(())
}
