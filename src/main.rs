use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::warn;

use apreboot::batch::{BatchOptions, BatchRunner, ConfirmPolicy};
use apreboot::config::{self, Credentials, DeviceTarget, EnvConfig, Timeouts};
use apreboot::error::RebootError;
use apreboot::inventory::Inventory;
use apreboot::report::{ConsoleReporter, ResultReporter};
use apreboot::session::TransportKind;

#[derive(Parser, Debug)]
#[command(
    name = "apreboot",
    version,
    about = "Reboot and query wireless access points over their interactive SSH shells",
    after_help = "EXAMPLES:\n  Reboot a single device:       apreboot -H 192.168.1.20 -u admin\n  Reboot a whole inventory:     apreboot -f devices.txt --no-confirm\n  Collect info, reboot nothing: apreboot -f devices.txt --query-only --json\n\nCredentials and defaults can also come from APREBOOT_* environment variables\n(APREBOOT_HOST, APREBOOT_USERNAME, APREBOOT_PASSWORD, APREBOOT_PORT,\nAPREBOOT_TIMEOUT, APREBOOT_REBOOT_TIMEOUT, APREBOOT_TRANSPORT)."
)]
struct Cli {
    /// Single device address to contact
    #[arg(short = 'H', long, conflicts_with = "file")]
    host: Option<String>,

    /// Inventory file with one device address per line
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Login username (prompted when neither flag nor environment has one)
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Login password (prompted interactively when omitted)
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// SSH port [default: 22]
    #[arg(long)]
    port: Option<u16>,

    /// When to ask for confirmation before rebooting
    #[arg(long, value_enum, default_value_t = ConfirmMode::Batch)]
    confirm: ConfirmMode,

    /// Skip every confirmation prompt (same as --confirm skip)
    #[arg(long, conflicts_with = "confirm")]
    no_confirm: bool,

    /// Collect device info before rebooting
    #[arg(short = 'i', long)]
    info: bool,

    /// Collect device info and never issue the reboot command
    #[arg(short = 'q', long)]
    query_only: bool,

    /// How sessions reach the devices [default: system]
    #[arg(long, value_enum)]
    transport: Option<TransportMode>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConfirmMode {
    /// One confirmation covering the whole batch
    Batch,
    /// Confirm each device individually after connecting
    Device,
    /// Never ask
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportMode {
    /// Drive the local ssh client under a pseudo-terminal
    System,
    /// Connect in-process with the bundled SSH implementation
    Ssh,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read username")?;
    let name = line.trim().to_string();
    if name.is_empty() {
        bail!("username must not be empty");
    }
    Ok(name)
}

/// Resolves transport selection: flag over environment over default.
fn resolve_transport(cli: Option<TransportMode>, env: Option<&str>) -> TransportKind {
    if let Some(mode) = cli {
        return match mode {
            TransportMode::System => TransportKind::System,
            TransportMode::Ssh => TransportKind::Ssh,
        };
    }
    match env {
        Some("ssh") => TransportKind::Ssh,
        Some("system") | None => TransportKind::System,
        Some(other) => {
            warn!("ignoring {}: unknown transport {other:?}", config::ENV_TRANSPORT);
            TransportKind::System
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let env = EnvConfig::load();

    let port = cli.port.or(env.port).unwrap_or(config::DEFAULT_PORT);
    let timeouts = env.apply_timeouts(Timeouts::default());
    let transport = resolve_transport(cli.transport, env.transport.as_deref());

    let username = match cli.username.or(env.username) {
        Some(name) => name,
        None => prompt_username()?,
    };
    let password = match cli.password.or(env.password) {
        Some(password) => password,
        None => rpassword::prompt_password(format!("Password for {username}: "))
            .context("failed to read password")?,
    };

    // Collected info is only rendered on the verbose path, so runs that
    // ask for it get that path without requiring -v.
    let verbose = cli.verbose > 0 || cli.info || cli.query_only;
    let mut reporter = if cli.json {
        // Progress on stderr keeps stdout clean for the JSON report.
        ConsoleReporter::with_stderr_progress(verbose)
    } else {
        ConsoleReporter::new(verbose)
    };

    let targets: Vec<DeviceTarget> = if let Some(path) = &cli.file {
        let inventory = Inventory::load(path)?;
        for warning in &inventory.warnings {
            reporter.inventory_warning(warning);
        }
        inventory
            .addresses
            .iter()
            .map(|address| DeviceTarget::new(address.clone(), port))
            .collect()
    } else if let Some(host) = cli.host.or(env.host) {
        vec![DeviceTarget::new(host, port)]
    } else {
        bail!("no devices given; use --host or --file");
    };

    let confirm = if cli.no_confirm {
        ConfirmPolicy::SkipAll
    } else {
        match cli.confirm {
            ConfirmMode::Batch => ConfirmPolicy::PerBatch,
            ConfirmMode::Device => ConfirmPolicy::PerDevice,
            ConfirmMode::Skip => ConfirmPolicy::SkipAll,
        }
    };

    let mut runner = BatchRunner::new(Credentials::new(username, password), transport);
    runner.timeouts = timeouts;
    runner.options = BatchOptions {
        confirm,
        gather_info: cli.info,
        query_only: cli.query_only,
    };

    let cancel = runner.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next checkpoint");
            cancel.cancel();
        }
    });

    let report = runner.run(&targets, &mut reporter).await?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to render JSON report")?
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<RebootError>() {
                Some(RebootError::Cancelled) => eprintln!("Cancelled."),
                _ => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
