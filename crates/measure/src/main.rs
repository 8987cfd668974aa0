//! jcbench command line interface

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use jcbench::Driver;
use jcbench_transport_pcsc::PcscChannel;

#[derive(Debug, Parser)]
#[command(name = "jcbench", about = "Java Card operation benchmark", version)]
struct Cli {
    /// PC/SC reader name; the first reader holding a card is used if unset
    #[arg(long, short)]
    reader: Option<String>,

    /// Directory holding the case description files
    #[arg(long, short, default_value = "cases")]
    cases: PathBuf,

    /// Report output path; defaults to a timestamped file
    #[arg(long, short = 'o')]
    report: Option<PathBuf>,

    /// List available readers and exit
    #[arg(long)]
    list_readers: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.list_readers {
        for (name, has_card) in jcbench_transport_pcsc::list_readers()? {
            println!("{name}    {}", if has_card { "card present" } else { "empty" });
        }
        return Ok(());
    }

    let channel = match &cli.reader {
        Some(name) => PcscChannel::named(name)?,
        None => PcscChannel::autodetect(),
    };

    let driver = Driver::from_dir(&cli.cases)?;
    let reporter = driver.run(channel)?;

    let report_path = cli.report.unwrap_or_else(|| {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        PathBuf::from(format!("report_{stamp}.txt"))
    });
    reporter.write_to_file(&report_path)?;
    println!("report written to {}", report_path.display());
    Ok(())
}
