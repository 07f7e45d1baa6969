#![deny(warnings)]

//! Fee allocation engine: common-area shares and maintenance fees.
//!
//! The engine runs in two pure stages over a full building snapshot:
//! - [`allocate_areas`] spreads floor and building-wide common area over units
//!   by net area and derives each unit's weighted billing area;
//! - [`distribute_fees`] / [`distribute_by_rate`] roll child units into their
//!   billing parent and price every billable unit.
//!
//! Degenerate denominators (empty floors, zero total weight) resolve to a zero
//! contribution; the engine never fails and never yields NaN or infinity.

use chrono::NaiveDateTime;
use estate_core::{audit_units, BuildingSettings, FeeDriver, Unit};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub mod statement;
pub mod summary;

pub use statement::{fee_statement, FeeError, FeeLine};
pub use summary::{summarize, BuildingSummary, FloorSummary};

/// `pool * part / whole`, or 0 when `whole` is not positive.
fn proportional(pool: f64, part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        pool * (part / whole)
    } else {
        0.0
    }
}

/// Distribute common areas and compute weighted billing areas.
///
/// Returns a new list of the same length and order. Only the four area fields
/// are recomputed; every other field is copied from the input.
pub fn allocate_areas(units: &[Unit], settings: &BuildingSettings) -> Vec<Unit> {
    let common = &settings.common_areas;
    let total_net: f64 = units.iter().map(|u| u.net_sqm).sum();
    let mut floor_totals: BTreeMap<&str, f64> = BTreeMap::new();
    for u in units {
        *floor_totals.entry(u.floor_key()).or_insert(0.0) += u.net_sqm;
    }

    let allocated: Vec<Unit> = units
        .iter()
        .map(|u| {
            let floor_total = floor_totals.get(u.floor_key()).copied().unwrap_or(0.0);
            let mut out = u.clone();
            out.share_local_common =
                proportional(common.floor_standard_sqm, u.net_sqm, floor_total);
            out.share_global_common =
                proportional(common.global_amenities_sqm, u.net_sqm, total_net);
            out.total_gross_sqm = u.net_sqm + out.share_local_common + out.share_global_common;
            out.weighted_billing_area =
                out.total_gross_sqm * settings.financials.type_factor(&u.unit_type);
            out
        })
        .collect();
    debug!(
        units = units.len(),
        floors = floor_totals.len(),
        total_net,
        "allocated common areas"
    );
    allocated
}

/// Effective measure per unit: `Some(own + direct children)` for billable
/// units, `None` for children. Children whose parent is missing contribute
/// nowhere.
fn rolled_up<F>(units: &[Unit], measure: F) -> Vec<Option<f64>>
where
    F: Fn(&Unit) -> f64,
{
    let mut children: BTreeMap<&str, f64> = BTreeMap::new();
    for u in units {
        if let Some(parent) = u.billing_parent_code.as_deref() {
            *children.entry(parent).or_insert(0.0) += measure(u);
        }
    }
    units
        .iter()
        .map(|u| {
            u.is_billable()
                .then(|| measure(u) + children.get(u.code.as_str()).copied().unwrap_or(0.0))
        })
        .collect()
}

fn apply_fees<F>(units: &[Unit], effective: &[Option<f64>], price: F) -> Vec<Unit>
where
    F: Fn(f64) -> f64,
{
    units
        .iter()
        .zip(effective)
        .map(|(u, eff)| {
            let mut out = u.clone();
            out.current_maintenance_fee = eff.map_or(0.0, |area| finite_or_zero(price(area)));
            out
        })
        .collect()
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Effective weighted billing area per unit (`None` for child units).
pub fn effective_weighted_areas(units: &[Unit]) -> Vec<Option<f64>> {
    rolled_up(units, |u| u.weighted_billing_area)
}

/// Share `budget` across billable units by effective weighted area.
///
/// Child units get a fee of 0. When the total weight is zero every fee is 0.
/// Each fee is `budget * (effective / total_weight)`, which stays finite for
/// subnormal weights where `budget / total_weight` alone would overflow.
pub fn distribute_fees(units: &[Unit], budget: f64) -> Vec<Unit> {
    let effective = effective_weighted_areas(units);
    let total_weight: f64 = effective.iter().flatten().sum();
    let budget = if total_weight > 0.0 && total_weight.is_finite() {
        finite_or_zero(budget)
    } else {
        0.0
    };
    debug!(budget, total_weight, "distributed budget");
    apply_fees(units, &effective, |area| {
        if budget == 0.0 {
            0.0
        } else {
            budget * (area / total_weight)
        }
    })
}

/// Price billable units at `rate` per gross m², children rolled into parents.
pub fn distribute_by_rate(units: &[Unit], rate: f64) -> Vec<Unit> {
    let effective = rolled_up(units, |u| u.total_gross_sqm);
    let rate = finite_or_zero(rate);
    debug!(rate, "applied rate per sqm");
    apply_fees(units, &effective, |area| area * rate)
}

/// Run the distributor matching `driver`.
pub fn distribute(units: &[Unit], driver: &FeeDriver) -> Vec<Unit> {
    match driver {
        FeeDriver::Budget(budget) => distribute_fees(units, budget.to_f64().unwrap_or(0.0)),
        FeeDriver::Rate(rate) => distribute_by_rate(units, rate.to_f64().unwrap_or(0.0)),
    }
}

/// Full pipeline: area allocation followed by fee distribution.
///
/// Billing-link inconsistencies are logged as warnings; they never abort.
pub fn recalculate(units: &[Unit], settings: &BuildingSettings) -> Vec<Unit> {
    for w in audit_units(units) {
        warn!(%w, "unit data inconsistency");
    }
    let allocated = allocate_areas(units, settings);
    distribute(&allocated, &settings.financials.driver())
}

/// Which part of the pipeline a change invalidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecalcStage {
    /// Areas and fees.
    Full,
    /// Fees only; area allocation is still valid.
    FeesOnly,
}

/// Decide what a settings change requires, if anything.
///
/// Common areas and type multipliers feed the allocator; the method, budget
/// and rate feed only the distributor. A change to the input the current
/// method does not use requires nothing.
pub fn required_stage(old: &BuildingSettings, new: &BuildingSettings) -> Option<RecalcStage> {
    if old.common_areas != new.common_areas
        || old.financials.type_multipliers != new.financials.type_multipliers
    {
        Some(RecalcStage::Full)
    } else if old.financials.driver() != new.financials.driver() {
        Some(RecalcStage::FeesOnly)
    } else {
        None
    }
}

/// Whether anything besides `last_recalculation_date` differs.
pub fn settings_changed(old: &BuildingSettings, new: &BuildingSettings) -> bool {
    let unstamped = |s: &BuildingSettings| {
        let mut s = s.clone();
        s.financials.last_recalculation_date = None;
        s
    };
    unstamped(old) != unstamped(new)
}

/// Outcome of applying a settings change to an allocated unit list.
#[derive(Clone, Debug, PartialEq)]
pub struct Recalculation {
    pub units: Vec<Unit>,
    pub settings: BuildingSettings,
    pub stage: Option<RecalcStage>,
}

/// Re-run the stage a settings change requires and stamp the new settings.
///
/// The stamp is applied whenever the settings changed, even when the change
/// needs no recomputation (e.g. a new rate on a budget-based building).
///
/// `units` must be the output of a previous run under `old`; when only the fee
/// driver changed, their area fields are reused as they are.
pub fn apply_settings_change(
    units: &[Unit],
    old: &BuildingSettings,
    new: &BuildingSettings,
    at: NaiveDateTime,
) -> Recalculation {
    let stage = required_stage(old, new);
    let mut settings = new.clone();
    let units = match stage {
        Some(RecalcStage::Full) => recalculate(units, new),
        Some(RecalcStage::FeesOnly) => distribute(units, &new.financials.driver()),
        None => units.to_vec(),
    };
    if settings_changed(old, new) {
        settings.financials.last_recalculation_date = Some(at);
    }
    debug!(?stage, "applied settings change");
    Recalculation {
        units,
        settings,
        stage,
    }
}
