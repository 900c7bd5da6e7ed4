use serde::{Deserialize, Serialize};

use super::error::{InvalidInputError, non_negative};
use super::types::AllocationSet;

const ALLOCATION_TOLERANCE: f64 = 0.01;

/// Rescales weights to whole percentages summing to exactly 100. The rounding
/// remainder goes to the first key. An all-zero set is returned unchanged.
///
/// Individual weights are not bounded: when many small weights round up, the
/// first key can end up below 0 (or above 100) so that the total stays 100.
pub fn normalize(weights: &AllocationSet) -> AllocationSet {
    let total = weights.total();
    if total == 0.0 || !total.is_finite() {
        return weights.clone();
    }

    let mut normalized = weights.clone();
    for weight in normalized.weights_mut() {
        *weight = (*weight / total * 100.0).round();
    }

    let remainder = 100.0 - normalized.total();
    if let Some(first) = normalized.weights_mut().next() {
        *first += remainder;
    }
    normalized
}

pub fn ensure_complete(weights: &AllocationSet) -> Result<(), InvalidInputError> {
    if weights.is_empty() {
        return Err(InvalidInputError::EmptyAllocations);
    }
    for (_, weight) in weights.iter() {
        non_negative("assetAllocations", weight)?;
    }
    let total = weights.total();
    if (total - 100.0).abs() > ALLOCATION_TOLERANCE {
        return Err(InvalidInputError::AllocationTotal { total });
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPreset {
    pub allocation: AllocationSet,
    pub rationale: &'static str,
}

pub fn preset_for(risk: RiskTolerance) -> AllocationPreset {
    match risk {
        RiskTolerance::Conservative => AllocationPreset {
            allocation: AllocationSet::from_pairs([
                ("bonds", 50.0),
                ("stocks", 25.0),
                ("reits", 15.0),
                ("cash", 10.0),
            ]),
            rationale: "Capital preservation first: half in bonds with minimal exposure to volatile \
                        assets. Expect steady returns at low risk.",
        },
        RiskTolerance::Moderate => AllocationPreset {
            allocation: AllocationSet::from_pairs([
                ("stocks", 50.0),
                ("bonds", 30.0),
                ("reits", 10.0),
                ("international", 7.0),
                ("cash", 3.0),
            ]),
            rationale: "Balanced 50/30/20 split across stocks, bonds and alternative assets for \
                        risk-adjusted growth.",
        },
        RiskTolerance::Aggressive => AllocationPreset {
            allocation: AllocationSet::from_pairs([
                ("stocks", 60.0),
                ("international", 20.0),
                ("reits", 10.0),
                ("crypto", 5.0),
                ("bonds", 5.0),
            ]),
            rationale: "Growth first: 60% stocks plus emerging asset classes. Higher volatility \
                        with stronger long-term expected returns.",
        },
    }
}
