use anyhow::Context;
use clap::{parser::ValueSource, Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use netsweep::{
    config::ScanConfig,
    limits,
    output::{sink_for, OutputFormat},
    ScanError, ScanOrchestrator, TcpConnectProber,
};

fn build_cli() -> Command {
    Command::new("netsweep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sweep every host of a CIDR range for open ports and save the results")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Target network in CIDR notation (e.g. 192.168.1.0/24). Prompted for when omitted")
                .index(1),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("PORTS")
                .help("Port range to scan (e.g. 1-1000 or 22,80,443)")
                .default_value("1-1000"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("COUNT")
                .help("Number of hosts scanned concurrently")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .value_name("JOBS")
                .help("Pending host jobs buffered ahead of the workers (default: worker count)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Connect timeout per port in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("host-concurrency")
                .long("host-concurrency")
                .value_name("COUNT")
                .help("Concurrent port connects per host")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Set the open file limit before scanning (Unix only)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .help("Report file (default: <target>_port_scan.<ext>)"),
        )
        .arg(
            Arg::new("output-format")
                .short('f')
                .long("output-format")
                .value_name("FORMAT")
                .help("Report format")
                .value_parser(["csv", "json", "text"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Load settings from a TOML file instead of ~/.netsweep.toml"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log per-host progress")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
}

fn prompt(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Merge config file values with command line flags. Flags win.
fn resolve_config(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)?,
        None => ScanConfig::load_default_config(),
    };

    let ports_from_cli = matches.value_source("ports") == Some(ValueSource::CommandLine);

    match matches.get_one::<String>("target") {
        Some(target) => config.target = target.clone(),
        None if config.target.is_empty() => {
            config.target = prompt("Enter the target IP address and subnet (e.g., 192.168.1.0/24): ")?;
            if !ports_from_cli {
                let ports = prompt(&format!("Enter the port range to scan (e.g., 1-1000) [{}]: ", config.ports))?;
                if !ports.is_empty() {
                    config.ports = ports;
                }
            }
        }
        None => {}
    }

    if ports_from_cli {
        if let Some(ports) = matches.get_one::<String>("ports") {
            config.ports = ports.clone();
        }
    }
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.workers = workers;
    }
    if let Some(&capacity) = matches.get_one::<usize>("queue-capacity") {
        config.queue_capacity = Some(capacity);
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config.connect_timeout_ms = timeout;
    }
    if let Some(&concurrency) = matches.get_one::<usize>("host-concurrency") {
        config.host_concurrency = concurrency;
    }
    if let Some(&limit) = matches.get_one::<u64>("ulimit") {
        config.ulimit = Some(limit);
    }
    if let Some(format) = matches.get_one::<String>("output-format") {
        config.output_format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    if let Some(file) = matches.get_one::<String>("output-file") {
        config.output_file = Some(PathBuf::from(file));
    }

    Ok(config)
}

async fn run(matches: ArgMatches, colored_output: bool) -> anyhow::Result<()> {
    let mut config = resolve_config(&matches)?;
    let fd_limit = limits::adjust_fd_limit(config.ulimit, config.fd_demand());
    config.fit_fd_limit(fd_limit)?;
    config.validate()?;

    let prober = Arc::new(TcpConnectProber::new(config.timeout_duration(), config.host_concurrency));
    let sink = sink_for(config.output_format, config.output_path(), colored_output);
    let orchestrator = ScanOrchestrator::from_config(&config);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "[!] Interrupted, finishing in-flight hosts...".bright_yellow());
            cancel.cancel();
        }
    });

    println!(
        "{} {} {} {}",
        "[~] Scanning".bright_blue(),
        config.target.bright_cyan().bold(),
        "ports".bright_blue(),
        config.ports.bright_white()
    );

    match orchestrator.scan(&config.target, &config.ports, prober, &*sink).await {
        Ok(report) => {
            println!(
                "{} Scan completed, {} open ports found on {} host(s) in {:.2?}",
                "[✓]".bright_green(),
                report.results.len().to_string().bright_green().bold(),
                report.responsive_hosts(),
                report.duration
            );
            if report.stats.probes_failed > 0 {
                println!(
                    "{} {} host(s) could not be scanned",
                    "[!]".bright_yellow(),
                    report.stats.probes_failed
                );
            }
            if report.stats.local_failures > 0 {
                println!(
                    "{} {} host(s) failed for lack of local sockets; lower --host-concurrency or raise --ulimit",
                    "[!]".bright_yellow(),
                    report.stats.local_failures
                );
            }
            if report.stats.cancelled {
                println!("{} Scan was interrupted; results are partial", "[!]".bright_yellow());
            }
            println!(
                "{} Scan results saved to {}",
                "[✓]".bright_green(),
                sink.destination().bright_white().bold()
            );
            Ok(())
        }
        Err(ScanError::Sink { source, results }) => {
            eprintln!(
                "{} Scan completed with {} row(s) but they could not be saved",
                "[!]".bright_red(),
                results.len()
            );
            Err(anyhow::Error::new(source).context(format!("failed to write {}", sink.destination())))
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let colored_output = !matches.get_flag("no-color");
    if !colored_output {
        colored::control::set_override(false);
    }

    if let Err(e) = run(matches, colored_output).await {
        eprintln!("{} {:#}", "[!] Error:".bright_red(), e);
        process::exit(1);
    }
}
