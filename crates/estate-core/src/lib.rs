#![deny(warnings)]

//! Core domain models and invariants for building maintenance fees.
//!
//! This crate defines the serializable snapshot types consumed by the fee
//! engine (units and building settings), the floor-grouping convention for
//! unit codes, and validation/audit helpers that guard the engine's inputs.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub mod synthetic;

/// Leading letters that denote a whole floor group on their own
/// (`B` basement, `G` ground / other spaces).
pub const RESERVED_FLOOR_MARKERS: [char; 2] = ['B', 'G'];

/// Extract the floor-group key from a unit code.
///
/// Codes starting with a reserved marker group under that single letter
/// ("B2" -> "B"). Every other code drops its last character, so "114" sits on
/// floor "11". Empty and single-character numeric codes map to "".
pub fn floor_key_of(code: &str) -> &str {
    match code.chars().next() {
        Some(c) if RESERVED_FLOOR_MARKERS.contains(&c) => &code[..c.len_utf8()],
        _ => match code.char_indices().next_back() {
            Some((last, _)) => &code[..last],
            None => "",
        },
    }
}

/// Category of a unit; drives the type multiplier lookup.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitType {
    /// Residential flat
    Flat,
    /// Two-storey residential unit
    Duplex,
    /// Retail space
    Shop,
    /// Office space
    Office,
    /// Unit merged into a neighbour for billing
    Merged,
    /// Any category not known to this crate, kept verbatim.
    Other(String),
}

impl UnitType {
    /// Name used as key in `Financials::type_multipliers`.
    pub fn as_str(&self) -> &str {
        match self {
            UnitType::Flat => "Flat",
            UnitType::Duplex => "Duplex",
            UnitType::Shop => "Shop",
            UnitType::Office => "Office",
            UnitType::Merged => "Merged",
            UnitType::Other(name) => name,
        }
    }
}

impl From<String> for UnitType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Flat" => UnitType::Flat,
            "Duplex" => UnitType::Duplex,
            "Shop" => UnitType::Shop,
            "Office" => UnitType::Office,
            "Merged" => UnitType::Merged,
            _ => UnitType::Other(s),
        }
    }
}

impl From<UnitType> for String {
    fn from(t: UnitType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One physical or billable space in the building.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique code; its prefix identifies the floor group.
    pub code: String,
    /// Unit category.
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    /// Code of the unit that absorbs this unit's cost, if any.
    #[serde(default)]
    pub billing_parent_code: Option<String>,
    /// Owned floor area in m² (>= 0).
    pub net_sqm: f64,
    /// Allocated share of the floor's standard common area.
    #[serde(default)]
    pub share_local_common: f64,
    /// Allocated share of the building-wide amenities area.
    #[serde(default)]
    pub share_global_common: f64,
    /// Net area plus both common shares.
    #[serde(default)]
    pub total_gross_sqm: f64,
    /// Gross area times the type factor.
    #[serde(default)]
    pub weighted_billing_area: f64,
    /// Annual maintenance fee; always 0 for child units.
    #[serde(default)]
    pub current_maintenance_fee: f64,
}

impl Unit {
    /// A billable unit with no computed fields yet.
    pub fn new(code: impl Into<String>, unit_type: UnitType, net_sqm: f64) -> Self {
        Self {
            code: code.into(),
            unit_type,
            billing_parent_code: None,
            net_sqm,
            share_local_common: 0.0,
            share_global_common: 0.0,
            total_gross_sqm: 0.0,
            weighted_billing_area: 0.0,
            current_maintenance_fee: 0.0,
        }
    }

    /// Attach this unit to a billing parent.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.billing_parent_code = Some(parent.into());
        self
    }

    pub fn is_billable(&self) -> bool {
        self.billing_parent_code.is_none()
    }

    pub fn floor_key(&self) -> &str {
        floor_key_of(&self.code)
    }

    /// Reset every field owned by the fee engine.
    pub fn clear_derived(&mut self) {
        self.share_local_common = 0.0;
        self.share_global_common = 0.0;
        self.total_gross_sqm = 0.0;
        self.weighted_billing_area = 0.0;
        self.current_maintenance_fee = 0.0;
    }
}

/// Shared areas distributed across units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonAreas {
    /// Building-wide amenity area in m².
    pub global_amenities_sqm: f64,
    /// Corridor/shaft area per floor group in m².
    pub floor_standard_sqm: f64,
}

/// Which financial input is fixed; the fee is derived from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    #[default]
    BudgetBased,
    RateBased,
}

/// The driving input handed to the fee distributor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeDriver {
    /// Annual budget shared across billable units by weight.
    Budget(Decimal),
    /// Price per gross m².
    Rate(Decimal),
}

/// Budget, rate and type weighting for the building.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub calculation_method: CalculationMethod,
    #[serde(default)]
    pub current_annual_budget: Decimal,
    #[serde(default)]
    pub rate_per_sqm: Decimal,
    /// Multiplier per unit type name; missing entries count as 1.0.
    #[serde(default)]
    pub type_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub last_recalculation_date: Option<NaiveDateTime>,
}

impl Financials {
    /// Pick the input matching `calculation_method`.
    pub fn driver(&self) -> FeeDriver {
        match self.calculation_method {
            CalculationMethod::BudgetBased => FeeDriver::Budget(self.current_annual_budget),
            CalculationMethod::RateBased => FeeDriver::Rate(self.rate_per_sqm),
        }
    }

    pub fn type_factor(&self, unit_type: &UnitType) -> f64 {
        self.type_multipliers
            .get(unit_type.as_str())
            .copied()
            .unwrap_or(1.0)
    }
}

/// Building-wide settings consumed by the fee engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingSettings {
    #[serde(rename = "commonAreas")]
    pub common_areas: CommonAreas,
    pub financials: Financials,
}

/// A full snapshot of one building as handed over by the application.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub settings: BuildingSettings,
    pub units: Vec<Unit>,
}

/// Validation errors for snapshot invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Unit code must not be blank.
    #[error("unit code must not be empty")]
    EmptyCode,
    /// Net area must be finite and >= 0.
    #[error("unit {0}: net area must be a finite, non-negative number")]
    InvalidArea(String),
    /// Common area settings must be finite and >= 0.
    #[error("common area `{0}` must be a finite, non-negative number")]
    InvalidCommonArea(&'static str),
    /// Type multipliers must be finite and >= 0.
    #[error("type multiplier for `{0}` must be a finite, non-negative number")]
    InvalidMultiplier(String),
    /// Budget and rate must be non-negative.
    #[error("negative monetary value is invalid")]
    NegativeMoney,
}

fn non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

/// Validate a single unit record.
pub fn validate_unit(u: &Unit) -> Result<(), ValidationError> {
    if u.code.trim().is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    if !non_negative(u.net_sqm) {
        return Err(ValidationError::InvalidArea(u.code.clone()));
    }
    Ok(())
}

/// Validate building settings.
pub fn validate_settings(s: &BuildingSettings) -> Result<(), ValidationError> {
    if !non_negative(s.common_areas.global_amenities_sqm) {
        return Err(ValidationError::InvalidCommonArea("global_amenities_sqm"));
    }
    if !non_negative(s.common_areas.floor_standard_sqm) {
        return Err(ValidationError::InvalidCommonArea("floor_standard_sqm"));
    }
    for (name, m) in &s.financials.type_multipliers {
        if !non_negative(*m) {
            return Err(ValidationError::InvalidMultiplier(name.clone()));
        }
    }
    if s.financials.current_annual_budget < Decimal::ZERO
        || s.financials.rate_per_sqm < Decimal::ZERO
    {
        return Err(ValidationError::NegativeMoney);
    }
    Ok(())
}

/// Validate settings and every unit of a snapshot.
pub fn validate_snapshot(snap: &BuildingSnapshot) -> Result<(), ValidationError> {
    validate_settings(&snap.settings)?;
    for u in &snap.units {
        validate_unit(u)?;
    }
    Ok(())
}

/// Data inconsistencies the fee engine tolerates but the caller should see.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DataWarning {
    /// Two or more units share a code; roll-up becomes ambiguous.
    #[error("unit code {0} appears more than once")]
    DuplicateCode(String),
    /// The named billing parent does not exist; the child's area is not billed.
    #[error("unit {code} names missing billing parent {parent}")]
    DanglingParent { code: String, parent: String },
    /// A unit names itself as billing parent.
    #[error("unit {0} is its own billing parent")]
    SelfParent(String),
    /// The billing parent is itself a child; only one level rolls up.
    #[error("unit {code} rolls up into {parent}, which is itself a child unit")]
    NestedParent { code: String, parent: String },
}

/// Find billing-link and identity problems in a unit list.
pub fn audit_units(units: &[Unit]) -> Vec<DataWarning> {
    let mut warnings = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut duplicates: BTreeSet<&str> = BTreeSet::new();
    let mut by_code: BTreeMap<&str, &Unit> = BTreeMap::new();
    for u in units {
        if !seen.insert(u.code.as_str()) {
            duplicates.insert(u.code.as_str());
        }
        by_code.entry(u.code.as_str()).or_insert(u);
    }
    warnings.extend(
        duplicates
            .into_iter()
            .map(|c| DataWarning::DuplicateCode(c.to_string())),
    );

    for u in units {
        let Some(parent) = u.billing_parent_code.as_deref() else {
            continue;
        };
        if parent == u.code {
            warnings.push(DataWarning::SelfParent(u.code.clone()));
            continue;
        }
        match by_code.get(parent) {
            None => warnings.push(DataWarning::DanglingParent {
                code: u.code.clone(),
                parent: parent.to_string(),
            }),
            Some(p) if !p.is_billable() => warnings.push(DataWarning::NestedParent {
                code: u.code.clone(),
                parent: parent.to_string(),
            }),
            Some(_) => {}
        }
    }
    debug!(units = units.len(), warnings = warnings.len(), "audited units");
    warnings
}
