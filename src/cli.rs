use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tenancy_settlement::batch::{self, BillingJob};
use tenancy_settlement::config::{parse_rate, Config};
use tenancy_settlement::error::{Error, Result};
use tenancy_settlement::logger;
use tenancy_settlement::money::format_amount;
use tenancy_settlement::orchestrator::{SettlementOrchestrator, Tenancy};
use tenancy_settlement::period::Period;
use tenancy_settlement::reading::MeterReading;
use tenancy_settlement::storage::{FileStorage, MemoryRepository, SnapshotStore};

#[derive(Parser)]
#[command(name = "tenancy-settlement")]
#[command(about = "Utility billing and end-of-tenancy deposit settlement")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: "human" or "json"
    #[arg(short, long)]
    pub format: Option<String>,

    /// Data directory path
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// Late fee per day past the planned move-out date
    #[arg(long)]
    pub daily_late_rate: Option<String>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the data directory with an empty snapshot
    Init,

    /// Submit a pending meter reading
    Submit {
        meter: String,
        apartment: String,
        period: String,
        value: String,
    },

    /// Approve a pending meter reading
    Approve {
        meter: String,
        apartment: String,
        period: String,
    },

    /// Reject a pending meter reading
    Reject {
        meter: String,
        apartment: String,
        period: String,
    },

    /// Show required-meter completeness for a tenancy's apartment
    Check { tenancy: String, period: String },

    /// Compute the utility bill for a tenancy's apartment
    Bill { tenancy: String, period: String },

    /// Settle a tenancy's deposit
    Settle {
        tenancy: String,

        /// Settlement date (YYYY-MM-DD); defaults to today (UTC)
        #[arg(long)]
        today: Option<String>,
    },

    /// Bill every tenancy for one period
    BatchBill { period: String },

    /// Settle every tenancy
    BatchSettle {
        #[arg(long)]
        today: Option<String>,
    },
}

fn parse_period(s: &str) -> Result<Period> {
    Period::parse(s)
}

fn parse_date(s: Option<&str>) -> Result<NaiveDate> {
    match s {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| Error::InvalidInput(format!("Invalid date {:?}: {}", s, e))),
        None => Ok(tenancy_settlement::today_utc()),
    }
}

fn tenancy<'r>(repo: &'r MemoryRepository, id: &str) -> Result<&'r Tenancy> {
    repo.get_tenancy(id)
        .ok_or_else(|| Error::InvalidInput(format!("Tenancy {} not found", id)))
}

/// Format output based on format type
fn format_output<T: serde::Serialize + std::fmt::Debug>(data: &T, format: &str) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(data)
            .map_err(|e| Error::StorageError(format!("Failed to serialize JSON: {}", e))),
        _ => Ok(format!("{:#?}", data)),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(dir) = &cli.data_dir {
        config.set_data_dir(PathBuf::from(dir));
    }
    if let Some(format) = &cli.format {
        config.set_output_format(format.clone());
    }
    if let Some(level) = &cli.log_level {
        config.set_log_level(level.clone());
    }
    if let Some(rate) = &cli.daily_late_rate {
        config.set_daily_late_rate(parse_rate(rate)?);
    }
    Ok(config)
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    logger::init(config.get_log_level());

    let mut storage = FileStorage::new(&config);
    let format = config.get_output_format().to_string();

    match cli.command {
        Commands::Init => {
            fs::create_dir_all(config.get_data_dir())
                .map_err(|e| Error::StorageError(format!("Failed to create data directory: {}", e)))?;
            if storage.load_snapshot()?.is_none() {
                storage.persist_snapshot(&MemoryRepository::new())?;
            }
            println!("Initialized data directory at: {}", config.get_data_dir().display());
            Ok(())
        }

        Commands::Submit {
            meter,
            apartment,
            period,
            value,
        } => {
            let mut repo = storage.load_or_default()?;
            let value = Decimal::from_str(value.trim())
                .map_err(|e| Error::InvalidInput(format!("Invalid reading value {:?}: {}", value, e)))?;
            let reading = MeterReading::pending(&meter, &apartment, parse_period(&period)?, value)
                .submitted(chrono::Utc::now());
            repo.submit_reading(reading)?;
            storage.persist_snapshot(&repo)?;
            println!("✓ Reading submitted for {} / {} / {}", meter, apartment, period);
            Ok(())
        }

        Commands::Approve {
            meter,
            apartment,
            period,
        } => {
            let mut repo = storage.load_or_default()?;
            repo.approve_reading(&meter, &apartment, parse_period(&period)?)?;
            storage.persist_snapshot(&repo)?;
            println!("✓ Reading approved for {} / {} / {}", meter, apartment, period);
            Ok(())
        }

        Commands::Reject {
            meter,
            apartment,
            period,
        } => {
            let mut repo = storage.load_or_default()?;
            repo.reject_reading(&meter, &apartment, parse_period(&period)?)?;
            storage.persist_snapshot(&repo)?;
            println!("✓ Reading rejected for {} / {} / {}", meter, apartment, period);
            Ok(())
        }

        Commands::Check { tenancy: id, period } => {
            let repo = storage.load_or_default()?;
            let t = tenancy(&repo, &id)?;
            let orch = SettlementOrchestrator::new(&repo, config.settlement_config());
            let report = orch.check(&t.address_id, &t.apartment_id, parse_period(&period)?)?;
            println!("{}", format_output(&report, &format)?);
            Ok(())
        }

        Commands::Bill { tenancy: id, period } => {
            let repo = storage.load_or_default()?;
            let t = tenancy(&repo, &id)?;
            let orch = SettlementOrchestrator::new(&repo, config.settlement_config());
            let calc = orch.bill(
                &t.address_id,
                &t.apartment_id,
                parse_period(&period)?,
                t.apartment_area,
                t.total_building_area,
            )?;
            println!("{}", format_output(&calc, &format)?);
            if format != "json" {
                println!("  Total: {}", format_amount(calc.settled_total()));
            }
            Ok(())
        }

        Commands::Settle { tenancy: id, today } => {
            let repo = storage.load_or_default()?;
            let t = tenancy(&repo, &id)?;
            let orch = SettlementOrchestrator::new(&repo, config.settlement_config());
            let result = orch.settle(t, parse_date(today.as_deref())?)?;
            println!("{}", format_output(&result, &format)?);
            if format != "json" && result.is_blocked() {
                for reason in result.reason_messages() {
                    println!("  Blocked: {}", reason);
                }
            }
            Ok(())
        }

        Commands::BatchBill { period } => {
            let repo = storage.load_or_default()?;
            let period = parse_period(&period)?;
            let jobs: Vec<BillingJob> = repo
                .tenancies
                .values()
                .map(|t| BillingJob::for_tenancy(t, period))
                .collect();
            let orch = SettlementOrchestrator::new(&repo, config.settlement_config());
            let results = batch::bill_all(&orch, &jobs, config.workers);
            let rows: Vec<BatchRow> = jobs
                .iter()
                .zip(results)
                .map(|(job, r)| BatchRow::from_result(&job.apartment_id, r.map(|c| format_amount(c.settled_total()))))
                .collect();
            println!("{}", format_output(&rows, &format)?);
            Ok(())
        }

        Commands::BatchSettle { today } => {
            let repo = storage.load_or_default()?;
            let today = parse_date(today.as_deref())?;
            let tenancies: Vec<Tenancy> = repo.tenancies.values().cloned().collect();
            let orch = SettlementOrchestrator::new(&repo, config.settlement_config());
            let results = batch::settle_all(&orch, &tenancies, today, config.workers);
            let rows: Vec<BatchRow> = tenancies
                .iter()
                .zip(results)
                .map(|(t, r)| BatchRow::from_result(&t.id, r.map(|s| format!("{:?}", s.decision))))
                .collect();
            println!("{}", format_output(&rows, &format)?);
            Ok(())
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct BatchRow {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl BatchRow {
    fn from_result(id: &str, r: Result<String>) -> Self {
        match r {
            Ok(outcome) => BatchRow {
                id: id.to_string(),
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => BatchRow {
                id: id.to_string(),
                outcome: None,
                error: Some(e.to_string()),
            },
        }
    }
}
