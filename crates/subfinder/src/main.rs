use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subfinder::config::Config;
use subfinder::http::ReqwestFetcher;
use subfinder::model::{ensure_dir, export_to_json, export_to_markdown, AggregateResult, Target};
use subfinder::orchestrator::{Orchestrator, ProgressHandler};
use subfinder::sources::{self, Progress, Source};
use subfinder::{dns, Error, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

struct RunOptions {
    verbose: bool,
    resolve: bool,
}

fn main() -> Result<()> {
    let cli = Command::new(clap::crate_name!())
        .version(clap::crate_version!())
        .subcommand(Command::new("sources").about("List all sources"))
        .subcommand(
            Command::new("enum")
                .about("Enumerate the subdomains of a target")
                .arg(
                    Arg::new("target")
                        .help("The domain name to enumerate")
                        .value_name("TARGET")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("JSON config file holding API keys and per-source settings"),
                )
                .arg(
                    Arg::new("sources")
                        .long("sources")
                        .value_name("NAMES")
                        .value_delimiter(',')
                        .help("Only run these sources (comma separated)"),
                )
                .arg(
                    Arg::new("exclude")
                        .long("exclude")
                        .value_name("NAMES")
                        .value_delimiter(',')
                        .help("Do not run these sources (comma separated)"),
                )
                .arg(
                    Arg::new("timeout")
                        .short('t')
                        .long("timeout")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .help("Default per-source timeout in milliseconds"),
                )
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(ArgAction::SetTrue)
                        .help("Print subdomains as sources find them"),
                )
                .arg(
                    Arg::new("no-color")
                        .long("no-color")
                        .action(ArgAction::SetTrue)
                        .help("Disable colored progress output"),
                )
                .arg(
                    Arg::new("resolve")
                        .short('r')
                        .long("resolve")
                        .action(ArgAction::SetTrue)
                        .help("Keep only subdomains that resolve"),
                )
                .arg(
                    Arg::new("logs")
                        .short('s')
                        .long("logs")
                        .action(ArgAction::SetTrue)
                        .help("Save logs into a .log file"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Output format")
                        .value_name("OUTPUT")
                        .value_parser(["json", "md", "both", "none"])
                        .default_value("both"),
                ),
        )
        .arg_required_else_help(true)
        .get_matches();

    match cli.subcommand() {
        Some(("sources", _)) => sources::display_all(),
        Some(("enum", args)) => enumerate_command(args)?,

        // fallback if a cmd is not handled (should not possible)
        _ => {
            error!("{:12} - Command not handled, exit program", "CLI ERROR");
            return Err(Error::CliUsage("Command not handled".into()));
        }
    }

    Ok(())
}

fn enumerate_command(args: &ArgMatches) -> Result<()> {
    let Some(target) = args.get_one::<String>("target") else {
        return Err(Error::CliUsage("Missing target".into()));
    };
    let target = Target::parse(target)?;

    // create filename
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let filename = format!("{}", timestamp);

    // create output dir, only when a file lands in it
    let output_dir = format!("output/subfinder/{}", target);
    let save_logs = args.get_flag("logs");
    let format = args
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or("none");
    if writes_files(save_logs, format) {
        ensure_dir(output_dir.as_ref())?;
    }

    init_tracing_subscriber(save_logs, output_dir.as_ref(), &filename);

    // config and sources
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(timeout_ms) = args.get_one::<u64>("timeout") {
        config = config.with_timeout_ms(*timeout_ms);
    }
    let include: Vec<String> = args
        .get_many::<String>("sources")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();
    let exclude: Vec<String> = args
        .get_many::<String>("exclude")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();
    let selected = sources::select(&config, &include, &exclude)?;

    if args.get_flag("no-color") {
        colored::control::set_override(false);
    }
    let options = RunOptions {
        verbose: args.get_flag("verbose"),
        resolve: args.get_flag("resolve"),
    };

    // run the enumeration
    info!("Enumerating {} (run_{})", target, timestamp);
    let result = run(target, config, selected, options)?;

    report(&result);

    // write result
    if format == "both" || format == "json" {
        let json_path = Path::new(&output_dir)
            .join(&filename)
            .with_extension("json");
        export_to_json(&result, &json_path)?;
    }

    if format == "both" || format == "md" {
        let md_path = Path::new(&output_dir).join(&filename).with_extension("md");
        export_to_markdown(&result, &md_path)?;
    }

    Ok(())
}

#[tokio::main]
async fn run(
    target: Target,
    config: Config,
    selected: Vec<Box<dyn Source>>,
    options: RunOptions,
) -> Result<AggregateResult> {
    let fetcher = Arc::new(ReqwestFetcher::new()?);
    let mut orchestrator = Orchestrator::new(fetcher);
    if options.verbose {
        orchestrator = orchestrator.with_progress(progress_printer());
    }

    let mut result = tokio::select! {
        result = orchestrator.enumerate(&target, &config, selected) => result,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, aborting running sources");
            return Err(Error::Cancelled);
        }
    };

    if options.resolve {
        let dns_resolver = dns::new_resolver();
        result.resolved = dns::resolve_all(&dns_resolver, &result.subdomains).await;
    }

    Ok(result)
}

fn progress_printer() -> ProgressHandler {
    Arc::new(|progress: &Progress| {
        eprintln!(
            "[{}] {}",
            progress.source.to_uppercase().red(),
            progress.subdomain
        );
    })
}

fn report(result: &AggregateResult) {
    for (source, reason) in &result.skipped {
        warn!("{:12} - {} ({})", "SKIPPED", source, reason);
    }
    for (source, err) in &result.errors {
        warn!("{:12} - {} ({})", "FAILED", source, err);
    }

    if result.resolved.is_empty() {
        for subdomain in &result.subdomains {
            println!("{}", subdomain);
        }
    } else {
        for host in &result.resolved {
            let ips: Vec<String> = host.ips.iter().map(|ip| ip.to_string()).collect();
            println!("{} {}", host.domain, ips.join(","));
        }
    }

    info!(
        "{} unique subdomains from {} sources in {}ms",
        result.subdomains.len(),
        result.sources.len(),
        result.elapsed_ms
    );
}

fn writes_files(save_logs: bool, format: &str) -> bool {
    save_logs || format != "none"
}

fn init_tracing_subscriber(save_logs_file: bool, output_dir: &Path, filename: &str) {
    // stdout is reserved for results, terminal logs go to stderr
    let base = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(FmtSpan::CLOSE)
        .with_file(false)
        .with_target(false);

    if !save_logs_file {
        let terminal_subscriber = base.with_ansi(true).with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(terminal_subscriber)
            .expect("Unable to set global subscriber");
        return;
    }

    // plain text file, plus the terminal as a second layer
    let file_appender =
        RollingFileAppender::new(Rotation::NEVER, output_dir, format!("{}.log", filename));
    let file_subscriber = base.with_ansi(false).with_writer(file_appender).finish();
    let stderr_layer = layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_file(false)
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing::subscriber::set_global_default(file_subscriber.with(stderr_layer))
        .expect("Unable to set global subscriber with file layer");
}

// region:        --- Tests


// endregion:     --- Tests
