//! Deterministic synthetic buildings for demos and benchmarks.

use crate::{
    BuildingSettings, BuildingSnapshot, CalculationMethod, CommonAreas, Financials, Unit,
    UnitType,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// Generate a building with a ground floor of shops and `floors` numbered
/// floors of up to nine units each (the last code digit is the unit index).
///
/// Roughly one in ten upper-floor units is merged into its left neighbour.
/// The same seed always yields the same snapshot.
pub fn generate_building(floors: u32, units_per_floor: u32, seed: u64) -> BuildingSnapshot {
    let per_floor = units_per_floor.clamp(1, 9);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut units = Vec::with_capacity(((floors + 1) * per_floor) as usize);

    for idx in 1..=per_floor {
        units.push(Unit::new(format!("G{idx}"), UnitType::Shop, area(&mut rng)));
    }
    for floor in 1..=floors {
        for idx in 1..=per_floor {
            let code = format!("{floor}{idx}");
            if idx > 1 && rng.gen_bool(0.1) {
                let parent = format!("{floor}{}", idx - 1);
                // never chain a merge onto a unit that is already merged
                let parent_billable = units
                    .last()
                    .map(|u: &Unit| u.code == parent && u.is_billable())
                    .unwrap_or(false);
                if parent_billable {
                    units.push(Unit::new(code, UnitType::Merged, area(&mut rng)).with_parent(parent));
                    continue;
                }
            }
            let unit_type = match rng.gen_range(0..10) {
                0 => UnitType::Office,
                1 | 2 => UnitType::Duplex,
                _ => UnitType::Flat,
            };
            units.push(Unit::new(code, unit_type, area(&mut rng)));
        }
    }
    debug!(floors, units = units.len(), seed, "generated synthetic building");

    let settings = BuildingSettings {
        common_areas: CommonAreas {
            global_amenities_sqm: 40.0 * f64::from(floors.max(1)),
            floor_standard_sqm: 12.0 * f64::from(per_floor),
        },
        financials: Financials {
            calculation_method: CalculationMethod::BudgetBased,
            current_annual_budget: Decimal::new(2_400, 0) * Decimal::from(units.len()),
            rate_per_sqm: Decimal::new(1850, 2),
            type_multipliers: BTreeMap::from([
                ("Shop".to_string(), 1.5),
                ("Office".to_string(), 1.2),
                ("Duplex".to_string(), 1.1),
            ]),
            last_recalculation_date: None,
        },
    };
    BuildingSnapshot { settings, units }
}

fn area(rng: &mut ChaCha8Rng) -> f64 {
    let a: f64 = rng.gen_range(45.0..=220.0);
    (a * 10.0).round() / 10.0
}
