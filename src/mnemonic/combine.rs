use super::{Blocks, Descriptor, Mnemonic, Samples, Values};
use crate::error::{EngdbError, EngdbResult};
use crate::units::compose_units;
use std::collections::HashMap;
use std::ops::{Add, Mul};
use tracing::{debug, warn};

impl Mnemonic {
    /// Concatenate two retrievals of the same mnemonic.
    ///
    /// The operand whose data starts earlier goes first. Samples are sorted
    /// and duplicate timestamps collapse to the first occurrence. Either
    /// operand being empty returns the other unchanged.
    pub fn combine(&self, other: &Mnemonic) -> EngdbResult<Mnemonic> {
        if self.identifier != other.identifier {
            return Err(EngdbError::validation(format!(
                "Unable to concatenate EdbMnemonic instances for {} and {}",
                self.identifier, other.identifier
            )));
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }

        let (early, late) = if other.data_start() < self.data_start() {
            (other, self)
        } else {
            (self, other)
        };

        let all_dates: Vec<_> = early.dates().iter().chain(late.dates()).copied().collect();
        let all_values = early.values().concat(late.values())?;

        // Stable sort keeps the earlier operand's sample first on ties
        let mut order: Vec<usize> = (0..all_dates.len()).collect();
        order.sort_by_key(|&i| all_dates[i]);
        order.dedup_by_key(|i| all_dates[*i]);

        let overlap = all_dates.len() - order.len();
        if overlap > 0 {
            debug!("{}: dropped {} duplicate samples", self.identifier, overlap);
        }

        let blocks = merge_blocks(early.blocks(), early.len(), late.blocks(), late.len(), overlap);
        let samples = Samples::from_parts_unchecked(
            order.iter().map(|&i| all_dates[i]).collect(),
            all_values.select(&order),
        );

        Ok(Mnemonic::new(
            self.identifier.clone(),
            self.requested_start.min(other.requested_start),
            self.requested_end.max(other.requested_end),
            samples,
            self.meta.clone(),
            self.descriptor.clone(),
            blocks,
        ))
    }

    /// Product of two numeric mnemonics on this mnemonic's timestamps.
    ///
    /// `other` is first resampled onto this mnemonic's dates, then only the
    /// timestamps present in both are kept. When `other` has fewer than two
    /// samples the result is `other` with its samples cleared.
    pub fn multiply(&self, other: &Mnemonic) -> EngdbResult<Mnemonic> {
        if other.len() < 2 {
            return Ok(other.emptied());
        }

        let resampled = other.interpolate(self.dates())?;

        let (Values::Numeric(ours), Values::Numeric(theirs)) = (self.values(), resampled.values())
        else {
            return Err(EngdbError::validation(format!(
                "Unable to multiply non-numeric mnemonics {} and {}",
                self.identifier, other.identifier
            )));
        };

        let lookup: HashMap<_, usize> = resampled
            .dates()
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i))
            .collect();

        let mut dates = Vec::new();
        let mut products = Vec::new();
        let mut kept_theirs = 0;
        for (i, date) in self.dates().iter().enumerate() {
            if dates.last() == Some(date) {
                continue;
            }
            if let Some(&j) = lookup.get(date) {
                dates.push(*date);
                products.push(ours[i] * theirs[j]);
                kept_theirs += 1;
            }
        }

        // Boundaries survive from whichever operand kept all its samples
        let blocks = if dates.len() == self.len() {
            self.blocks().clone()
        } else if kept_theirs == resampled.len() {
            resampled.blocks().clone()
        } else {
            return Err(EngdbError::validation(format!(
                "Cannot determine block boundaries for {} * {}: both operands lost samples",
                self.identifier, other.identifier
            )));
        };

        let descriptor = multiply_descriptors(self.descriptor.as_ref(), other.descriptor.as_ref());
        let samples = Samples::from_parts_unchecked(dates, Values::Numeric(products));

        Ok(Mnemonic::new(
            self.identifier.clone(),
            self.requested_start,
            self.requested_end,
            samples,
            self.meta.clone(),
            descriptor,
            blocks,
        ))
    }
}

fn multiply_descriptors(first: Option<&Descriptor>, second: Option<&Descriptor>) -> Option<Descriptor> {
    let (Some(first), Some(second)) = (first, second) else {
        return first.cloned();
    };
    let (Some(first_unit), Some(second_unit)) = (&first.unit, &second.unit) else {
        return Some(first.clone());
    };

    match compose_units(first_unit, second_unit) {
        Some(unit) => Some(Descriptor {
            tlm_mnemonic: format!("{} * {}", first.tlm_mnemonic, second.tlm_mnemonic),
            description: format!("({}) * ({})", first.description, second.description),
            unit: Some(unit),
            ..first.clone()
        }),
        None => {
            warn!(
                "Units '{}' and '{}' not recognized; keeping descriptor of {}",
                first_unit, second_unit, first.tlm_mnemonic
            );
            Some(first.clone())
        }
    }
}

/// Merge block boundaries of two concatenated series. An unknown side counts
/// as one block covering all of its samples once the other side is known.
fn merge_blocks(
    early: &Blocks,
    early_len: usize,
    late: &Blocks,
    late_len: usize,
    overlap: usize,
) -> Blocks {
    if *early == Blocks::Unknown && *late == Blocks::Unknown {
        return Blocks::Unknown;
    }

    let whole = |len: usize| vec![0, len];
    let early_bounds = early.boundaries().map_or_else(|| whole(early_len), <[usize]>::to_vec);
    let late_bounds = late.boundaries().map_or_else(|| whole(late_len), <[usize]>::to_vec);

    let mut merged: Vec<usize> = early_bounds.into_iter().filter(|&b| b <= early_len).collect();
    if merged.last().map_or(true, |&last| last < early_len) {
        merged.push(early_len);
    }

    let total = early_len + late_len - overlap;
    for boundary in late_bounds {
        let shifted = (early_len + boundary).saturating_sub(overlap).min(total);
        if merged.last().map_or(true, |&last| shifted > last) {
            merged.push(shifted);
        }
    }

    Blocks::Known(merged)
}

impl Add for &Mnemonic {
    type Output = EngdbResult<Mnemonic>;

    fn add(self, rhs: &Mnemonic) -> Self::Output {
        self.combine(rhs)
    }
}

impl Mul for &Mnemonic {
    type Output = EngdbResult<Mnemonic>;

    fn mul(self, rhs: &Mnemonic) -> Self::Output {
        self.multiply(rhs)
    }
}
