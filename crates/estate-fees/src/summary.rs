//! Building-level totals over a recalculated unit list.

use estate_core::Unit;
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals for one floor group.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FloorSummary {
    pub units: usize,
    pub net_sqm: f64,
    pub local_common_sqm: f64,
    pub gross_sqm: f64,
    pub weighted_area: f64,
    pub fees: f64,
}

impl FloorSummary {
    fn add(&mut self, u: &Unit) {
        self.units += 1;
        self.net_sqm += u.net_sqm;
        self.local_common_sqm += u.share_local_common;
        self.gross_sqm += u.total_gross_sqm;
        self.weighted_area += u.weighted_billing_area;
        self.fees += u.current_maintenance_fee;
    }
}

/// Totals for the whole building, keyed by floor group.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BuildingSummary {
    pub billable_units: usize,
    pub child_units: usize,
    pub global_common_sqm: f64,
    pub totals: FloorSummary,
    pub floors: BTreeMap<String, FloorSummary>,
}

/// Count units and add up areas and fees, overall and per floor group.
pub fn summarize(units: &[Unit]) -> BuildingSummary {
    let mut summary = BuildingSummary::default();
    for u in units {
        if u.is_billable() {
            summary.billable_units += 1;
        } else {
            summary.child_units += 1;
        }
        summary.global_common_sqm += u.share_global_common;
        summary.totals.add(u);
        summary
            .floors
            .entry(u.floor_key().to_string())
            .or_default()
            .add(u);
    }
    summary
}
