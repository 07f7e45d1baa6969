//! Fee statements: per-unit fees as money rounded to a fixed scale.
//!
//! Rounding each fee on its own can make the statement drift from the total
//! by a few cents. Lines are floored first and the leftover cents go to the
//! largest remainders, so the lines always add up to the rounded total.

use estate_core::{Unit, UnitType};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

/// Largest scale `Decimal` can represent.
const MAX_SCALE: u32 = 28;

/// Errors produced while building a fee statement.
#[derive(Debug, Error, PartialEq)]
pub enum FeeError {
    /// The fee is NaN or infinite.
    #[error("unit {0}: fee is not a finite number")]
    NonFinite(String),
    /// The fee is finite but beyond the range of `Decimal`.
    #[error("unit {0}: fee is too large for a decimal amount")]
    Overflow(String),
    /// Requested more decimal places than `Decimal` supports.
    #[error("scale {0} exceeds the supported 28 decimal places")]
    Scale(u32),
}

/// One row of a fee statement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeeLine {
    pub code: String,
    pub floor: String,
    pub unit_type: UnitType,
    pub billing_parent_code: Option<String>,
    pub fee: Decimal,
}

/// Build a statement with every fee rounded to `scale` decimal places.
pub fn fee_statement(units: &[Unit], scale: u32) -> Result<Vec<FeeLine>, FeeError> {
    if scale > MAX_SCALE {
        return Err(FeeError::Scale(scale));
    }
    let exact = units
        .iter()
        .map(|u| {
            let fee = u.current_maintenance_fee;
            if !fee.is_finite() {
                return Err(FeeError::NonFinite(u.code.clone()));
            }
            Decimal::from_f64(fee).ok_or_else(|| FeeError::Overflow(u.code.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let target = exact
        .iter()
        .sum::<Decimal>()
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    let mut rounded: Vec<Decimal> = exact
        .iter()
        .map(|x| x.round_dp_with_strategy(scale, RoundingStrategy::ToNegativeInfinity))
        .collect();

    let step = Decimal::new(1, scale);
    let mut leftover = target - rounded.iter().sum::<Decimal>();
    let mut order: Vec<usize> = (0..units.len()).collect();
    // stable sort keeps input order among equal remainders
    order.sort_by(|&a, &b| (exact[b] - rounded[b]).cmp(&(exact[a] - rounded[a])));
    for i in order {
        if leftover < step {
            break;
        }
        rounded[i] += step;
        leftover -= step;
    }

    Ok(units
        .iter()
        .zip(rounded)
        .map(|(u, fee)| FeeLine {
            code: u.code.clone(),
            floor: u.floor_key().to_string(),
            unit_type: u.unit_type.clone(),
            billing_parent_code: u.billing_parent_code.clone(),
            fee,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn billed(code: &str, fee: f64) -> Unit {
        let mut u = Unit::new(code, UnitType::Flat, 10.0);
        u.current_maintenance_fee = fee;
        u
    }

    #[test]
    fn three_way_split_adds_up() {
        let third = 100.0 / 3.0;
        let units = vec![billed("11", third), billed("12", third), billed("13", third)];
        let lines = fee_statement(&units, 2).unwrap();
        let fees: Vec<Decimal> = lines.iter().map(|l| l.fee).collect();
        assert_eq!(
            fees,
            vec![Decimal::new(3334, 2), Decimal::new(3333, 2), Decimal::new(3333, 2)]
        );
        assert_eq!(fees.iter().sum::<Decimal>(), Decimal::new(100, 0));
    }

    #[test]
    fn leftover_goes_to_largest_remainder() {
        let units = vec![billed("11", 10.004), billed("12", 20.008), billed("13", 5.0)];
        let lines = fee_statement(&units, 2).unwrap();
        assert_eq!(lines[0].fee, Decimal::new(1000, 2));
        assert_eq!(lines[1].fee, Decimal::new(2001, 2));
        assert_eq!(lines[2].fee, Decimal::new(500, 2));
    }

    #[test]
    fn lines_carry_unit_identity() {
        let units = vec![billed("B3", 12.5), billed("111", 0.0).with_parent("B3")];
        let lines = fee_statement(&units, 0).unwrap();
        assert_eq!(lines[0].floor, "B");
        assert_eq!(lines[0].fee, Decimal::new(13, 0));
        assert_eq!(lines[1].floor, "11");
        assert_eq!(lines[1].billing_parent_code.as_deref(), Some("B3"));
        assert_eq!(lines[1].fee, Decimal::ZERO);
    }

    #[test]
    fn rejects_nan_and_bad_scale() {
        assert_eq!(
            fee_statement(&[billed("11", f64::NAN)], 2),
            Err(FeeError::NonFinite("11".into()))
        );
        assert_eq!(
            fee_statement(&[billed("12", f64::INFINITY)], 2),
            Err(FeeError::NonFinite("12".into()))
        );
        assert_eq!(fee_statement(&[], 29), Err(FeeError::Scale(29)));
        assert!(fee_statement(&[], 2).unwrap().is_empty());
    }

    #[test]
    fn huge_finite_fee_is_an_overflow() {
        assert_eq!(
            fee_statement(&[billed("11", 1e30)], 2),
            Err(FeeError::Overflow("11".into()))
        );
    }

    #[test]
    fn lines_serialize_type_name_and_exact_fee() {
        let units = vec![billed("G2", 12.375).with_parent("G1")];
        let lines = fee_statement(&units, 2).unwrap();
        let v = serde_json::to_value(&lines).unwrap();
        assert_eq!(v[0]["unit_type"], "Flat");
        assert_eq!(v[0]["floor"], "G");
        assert_eq!(v[0]["billing_parent_code"], "G1");
        // rust_decimal writes amounts as strings so no precision is lost
        assert_eq!(v[0]["fee"], "12.38");
    }

    proptest! {
        #[test]
        fn statement_matches_rounded_total(fees in prop::collection::vec(0.0f64..100_000.0, 1..50)) {
            let units: Vec<Unit> = fees
                .iter()
                .enumerate()
                .map(|(i, f)| billed(&format!("{}{}", i / 9 + 1, i % 9 + 1), *f))
                .collect();
            let lines = fee_statement(&units, 2).unwrap();
            let exact: Decimal = fees.iter().map(|f| Decimal::from_f64(*f).unwrap()).sum();
            let total: Decimal = lines.iter().map(|l| l.fee).sum();
            prop_assert_eq!(total, exact.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero));
            for (line, f) in lines.iter().zip(&fees) {
                let diff = line.fee - Decimal::from_f64(*f).unwrap();
                prop_assert!(diff.abs() < Decimal::new(1, 2));
            }
        }
    }
}
