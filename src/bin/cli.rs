use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use hcpcs_rates::analytics::DEFAULT_TOP_CODES;
use hcpcs_rates::prelude::*;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "hcpcs")]
#[command(version, about = "HCPCS Rates CLI - Compute, reconcile, and report Medicare reimbursement and payment rates", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "HCPCS_CONFIG")]
    config: Option<PathBuf>,
    /// Root directory of the fee schedule files
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,
    /// Directory of payment addendum files
    #[arg(short, long, global = true)]
    payment_dir: Option<PathBuf>,
    /// Use non-facility PE RVUs
    #[arg(long, global = true)]
    non_facility: bool,
    /// Force recomputation instead of reusing cached results. Each CLI run
    /// starts with an empty cache, so this only matters to long-lived
    /// `RateService` users; accepted here for the same command surface.
    #[arg(long, global = true)]
    refresh: bool,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reimbursement rates and changes as JSON
    Rates {
        /// Only this group
        #[arg(long)]
        group: Option<String>,
    },
    /// Combined reimbursement and payment rates as JSON
    Combined,
    /// Combined rates for one code
    Code { code: String },
    /// Combined rates for one group
    Group { group: String },
    /// Everything known about one code
    History { code: String },
    /// Summary statistics
    Summary,
    /// Chart-ready trend data
    Trends {
        /// Number of top codes to include
        #[arg(long, default_value_t = DEFAULT_TOP_CODES)]
        top: usize,
    },
    /// Render a report
    Report(ReportArgs),
    /// Reimbursement rate from raw RVU inputs
    Calculate(CalculateArgs),
}

#[derive(Args)]
struct ReportArgs {
    /// Only this code
    #[arg(long, conflicts_with = "group")]
    code: Option<String>,
    /// Only this group
    #[arg(long)]
    group: Option<String>,
    /// Reimbursement-only report instead of combined
    #[arg(long)]
    reimbursement_only: bool,
    #[arg(long, value_enum, default_value_t = ReportFormatOpt::Html)]
    format: ReportFormatOpt,
    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CalculateArgs {
    #[arg(long)]
    work_rvu: f64,
    #[arg(long)]
    pe_rvu: f64,
    #[arg(long)]
    mp_rvu: f64,
    #[arg(long)]
    conversion_factor: f64,
    #[arg(long, default_value_t = 1.0)]
    work_gpci: f64,
    #[arg(long, default_value_t = 1.0)]
    pe_gpci: f64,
    #[arg(long, default_value_t = 1.0)]
    mp_gpci: f64,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum ReportFormatOpt {
    Html,
    Text,
    Json,
}

impl From<ReportFormatOpt> for ExportFormat {
    fn from(opt: ReportFormatOpt) -> Self {
        match opt {
            ReportFormatOpt::Html => ExportFormat::Html,
            ReportFormatOpt::Text => ExportFormat::Text,
            ReportFormatOpt::Json => ExportFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        let not_found = e.downcast_ref::<RatesError>().is_some_and(RatesError::is_not_found);
        match e.downcast_ref::<RatesError>() {
            Some(rates_error) => eprintln!("Error: {}", rates_error.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        process::exit(if not_found { 2 } else { 1 });
    }
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = AnalysisConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => AnalysisConfig::load(),
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
        if cli.payment_dir.is_none() {
            config.payment_dir = dir.join(hcpcs_rates::constants::PAYMENT_SUBDIR);
        }
    }
    if let Some(dir) = &cli.payment_dir {
        config.payment_dir = dir.clone();
    }
    if cli.non_facility {
        config.facility_type = FacilityType::NonFacility;
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let service = RateService::new(config);
    let refresh = cli.refresh;

    match cli.command {
        Commands::Rates { group } => match group {
            Some(name) => {
                let series = service.reimbursement_group(&name, refresh)?;
                print_json(&service.respond(series))
            }
            None => {
                let series = service.reimbursement(refresh)?;
                print_json(&service.respond(series.as_ref()))
            }
        },
        Commands::Combined => {
            let combined = service.combined(refresh)?;
            print_json(&service.respond(combined))
        }
        Commands::Code { code } => {
            let combined = service.combined_code(&ProcedureCode::new(&code), refresh)?;
            print_json(&service.respond(combined))
        }
        Commands::Group { group } => {
            let combined = service.combined_group(&group, refresh)?;
            print_json(&service.respond(combined))
        }
        Commands::History { code } => {
            let dataset = service.dataset(refresh)?;
            let history = dataset
                .history(&ProcedureCode::new(&code))
                .ok_or_else(|| RatesError::code_not_found(&code))?;
            print_json(&service.respond(history))
        }
        Commands::Summary => {
            let dataset = service.dataset(refresh)?;
            dataset.analytics().summary().print_summary();
            Ok(())
        }
        Commands::Trends { top } => {
            let dataset = service.dataset(refresh)?;
            print_json(&service.respond(dataset.analytics().trends(top)))
        }
        Commands::Report(args) => cmd_report(&service, args, refresh),
        Commands::Calculate(args) => {
            let inputs = RvuInputs::new(args.work_rvu, args.pe_rvu, args.mp_rvu, args.conversion_factor)
                .with_gpci(args.work_gpci, args.pe_gpci, args.mp_gpci);
            print_json(&service.calculate(inputs)?)
        }
    }
}

fn cmd_report(service: &RateService, args: ReportArgs, refresh: bool) -> Result<()> {
    let format = ExportFormat::from(args.format);

    let content = if args.reimbursement_only {
        service.reimbursement_report(args.group.as_deref(), format, refresh)?
    } else {
        let filter = match (args.code, args.group) {
            (Some(code), _) => ReportFilter::Code(ProcedureCode::new(code)),
            (None, Some(group)) => ReportFilter::Group(group),
            (None, None) => ReportFilter::All,
        };
        service.combined_report(&filter, format, refresh)?
    };

    match args.output {
        Some(path) => {
            fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}
