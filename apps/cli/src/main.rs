#![deny(warnings)]

//! Headless CLI: load a building snapshot, recalculate fees and report them.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, Utc};
use estate_core::{
    synthetic::generate_building, validate_snapshot, BuildingSettings, BuildingSnapshot,
    CalculationMethod, Unit,
};
use estate_fees::{
    apply_settings_change, fee_statement, recalculate, summarize, BuildingSummary, FeeLine,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: estate (--input <snapshot.json|yaml> | --synthetic <floors>x<units> [--seed N]) \
[--budget AMOUNT | --rate AMOUNT] [--format table|json] [--scale N] [--version]";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Format {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    input: Option<PathBuf>,
    synthetic: Option<(u32, u32)>,
    seed: u64,
    budget: Option<Decimal>,
    rate: Option<Decimal>,
    format: Format,
    scale: u32,
    version: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut parsed = Args {
        seed: 42,
        scale: 2,
        ..Args::default()
    };
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--input" => parsed.input = Some(PathBuf::from(value()?)),
            "--synthetic" => {
                let v = value()?;
                let (floors, units) = v
                    .split_once('x')
                    .with_context(|| format!("--synthetic expects <floors>x<units>, got {v}"))?;
                parsed.synthetic = Some((floors.parse()?, units.parse()?));
            }
            "--seed" => parsed.seed = value()?.parse()?,
            "--budget" => parsed.budget = Some(Decimal::from_str(&value()?)?),
            "--rate" => parsed.rate = Some(Decimal::from_str(&value()?)?),
            "--scale" => parsed.scale = value()?.parse()?,
            "--format" => {
                parsed.format = match value()?.as_str() {
                    "table" => Format::Table,
                    "json" => Format::Json,
                    other => bail!("unknown format {other}"),
                }
            }
            "--version" => parsed.version = true,
            other => bail!("unknown argument {other}\n{USAGE}"),
        }
    }
    if parsed.budget.is_some() && parsed.rate.is_some() {
        bail!("--budget and --rate are mutually exclusive");
    }
    Ok(parsed)
}

fn load_snapshot(path: &Path) -> Result<BuildingSnapshot> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let snap: BuildingSnapshot = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
        _ => serde_json::from_str(&text)?,
    };
    Ok(snap)
}

/// Settings after applying the command-line fee driver overrides.
fn overridden(settings: &BuildingSettings, args: &Args) -> BuildingSettings {
    let mut out = settings.clone();
    if let Some(budget) = args.budget {
        out.financials.calculation_method = CalculationMethod::BudgetBased;
        out.financials.current_annual_budget = budget;
    }
    if let Some(rate) = args.rate {
        out.financials.calculation_method = CalculationMethod::RateBased;
        out.financials.rate_per_sqm = rate;
    }
    out
}

/// Full recalculation of a loaded snapshot, with the settings stamped `at`.
fn recalculated(snap: &BuildingSnapshot, at: NaiveDateTime) -> (Vec<Unit>, BuildingSettings) {
    let units = recalculate(&snap.units, &snap.settings);
    let mut settings = snap.settings.clone();
    settings.financials.last_recalculation_date = Some(at);
    (units, settings)
}

#[derive(Serialize)]
struct Report<'a> {
    settings: &'a BuildingSettings,
    summary: &'a BuildingSummary,
    statement: &'a [FeeLine],
}

fn print_table(summary: &BuildingSummary, statement: &[FeeLine]) {
    println!(
        "{:<8} {:<6} {:<10} {:<8} {:>14}",
        "code", "floor", "type", "parent", "annual fee"
    );
    for line in statement {
        println!(
            "{:<8} {:<6} {:<10} {:<8} {:>14}",
            line.code,
            line.floor,
            line.unit_type,
            line.billing_parent_code.as_deref().unwrap_or("-"),
            line.fee
        );
    }
    println!();
    println!(
        "{:<6} {:>5} {:>10} {:>10} {:>10} {:>14}",
        "floor", "units", "net m2", "gross m2", "weighted", "fees"
    );
    for (key, f) in &summary.floors {
        println!(
            "{:<6} {:>5} {:>10.2} {:>10.2} {:>10.2} {:>14.2}",
            key, f.units, f.net_sqm, f.gross_sqm, f.weighted_area, f.fees
        );
    }
    println!(
        "Building | billable: {} | merged: {} | gross: {:.2} m2 | fees: {:.2}",
        summary.billable_units, summary.child_units, summary.totals.gross_sqm, summary.totals.fees
    );
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!(
            "estate {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }

    let snap = match (&args.input, args.synthetic) {
        (Some(path), _) => load_snapshot(path)?,
        (None, Some((floors, units))) => generate_building(floors, units, args.seed),
        (None, None) => bail!("{USAGE}"),
    };
    validate_snapshot(&snap)?;
    info!(units = snap.units.len(), "snapshot loaded");

    let now = Utc::now().naive_utc();
    let (units, settings) = recalculated(&snap, now);
    let new_settings = overridden(&settings, &args);
    let change = apply_settings_change(&units, &settings, &new_settings, now);
    info!(stage = ?change.stage, "fees recalculated");

    let summary = summarize(&change.units);
    let statement = fee_statement(&change.units, args.scale)?;
    match args.format {
        Format::Table => print_table(&summary, &statement),
        Format::Json => {
            let report = Report {
                settings: &change.settings,
                summary: &summary,
                statement: &statement,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
