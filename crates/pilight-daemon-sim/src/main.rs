use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use pilight_daemon_sim::{EventFeed, SimConfig, SimServer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn build_cli() -> Command {
    Command::new("pilight-daemon-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Simulated pilight daemon for testing clients")
        .arg(
            Arg::new("host")
                .long("host")
                .help("Address to bind")
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Port to bind")
                .value_parser(value_parser!(u16))
                .default_value("5000"),
        )
        .arg(
            Arg::new("accepted-protocol")
                .long("accepted-protocol")
                .help("Protocol whose send requests are acknowledged")
                .default_value("daycom"),
        )
        .arg(
            Arg::new("emit-events")
                .long("emit-events")
                .help("Push simulated button presses to receiver connections")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .help("Pause between emitted events in milliseconds")
                .value_parser(value_parser!(u64))
                .default_value("100"),
        )
        .arg(
            Arg::new("reject-receivers")
                .long("reject-receivers")
                .help("Refuse identifications that subscribe to receiver events")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
}

fn config_from_matches(matches: &ArgMatches) -> SimConfig {
    let feed = matches.get_flag("emit-events").then(|| {
        EventFeed::button_press()
            .with_interval_ms(matches.get_one::<u64>("interval-ms").copied().unwrap_or(100))
            .with_repeat(0)
    });

    SimConfig {
        host: matches
            .get_one::<String>("host")
            .cloned()
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        port: matches.get_one::<u16>("port").copied().unwrap_or(5000),
        accepted_protocol: matches
            .get_one::<String>("accepted-protocol")
            .cloned()
            .unwrap_or_else(|| "daycom".to_string()),
        reject_receivers: matches.get_flag("reject-receivers"),
        feed,
        heartbeat: true,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = config_from_matches(&matches);
    let exit_code = match run(config) {
        Ok(()) => 0,
        Err(e) => {
            error!(event = "sim.start_failed", error = %e);
            eprintln!("pilight-daemon-sim: {}", e);
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let server = SimServer::bind(config).await?;
        info!(event = "sim.listening", addr = %server.local_addr()?);

        let shutdown = CancellationToken::new();
        let signal_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(event = "sim.signal_received", signal = "SIGINT");
            }
            signal_shutdown.cancel();
        });

        server.run(shutdown).await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
