// =============================================================================
// Module: Risk calculation
// =============================================================================
//
//! Computes a risk document for a single RRA: pick the dominant attribute
//! cell, synthesize one scenario from it plus one scenario per indicator
//! event source observed on the RRA's linked assets, then reduce the
//! scenario scores into median/average/worst-case figures and labels.
//!
//! This implements the "latest" risk formula — RRA cells dominate, raw
//! indicator likelihoods contribute their own scenarios rather than being
//! blended into a compliance/vulnerability datapoint model.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::AppError;
use crate::types::{Label, Rra, RiskDocument, RiskScenario, RraCell, UsedAttribute};

/// Probability values above this are capped when synthesizing the
/// RRA-derived scenario; indicator-derived scenarios are left uncapped.
const RRA_PROBABILITY_CAP: f64 = 2.0;

fn cell_score(cell: RraCell) -> f64 {
    cell.impact.calc_value() * cell.probability.calc_value()
}

/// Picks the dominant attribute within one family (reputation,
/// productivity, or financial), comparing availability, confidentiality,
/// then integrity in that order with strict `>` so the first cell to
/// reach a given score wins ties.
fn highest_in_family(av: RraCell, it: RraCell, cf: RraCell) -> (f64, RraCell, &'static str) {
    let candidates = [("availability", av), ("confidentiality", cf), ("integrity", it)];
    let mut best_score = 0.0;
    let mut best = ("availability", av);
    for (name, cell) in candidates {
        let score = cell_score(cell);
        if score > best_score {
            best_score = score;
            best = (name, cell);
        }
    }
    (best_score, best.1, best.0)
}

/// Picks the single dominant (impact, probability) cell across all nine
/// attributes, comparing reputation, productivity, then financial in that
/// order with strict `>`. Returns an error if every cell scores zero —
/// there is nothing to base a risk document on.
fn find_highest_impact(rra: &Rra) -> Result<UsedAttribute, AppError> {
    let families = [
        (
            "reputation",
            rra.availability_reputation,
            rra.integrity_reputation,
            rra.confidentiality_reputation,
        ),
        (
            "productivity",
            rra.availability_productivity,
            rra.integrity_productivity,
            rra.confidentiality_productivity,
        ),
        (
            "financial",
            rra.availability_financial,
            rra.integrity_financial,
            rra.confidentiality_financial,
        ),
    ];

    let mut userisk = 0.0;
    let mut used: Option<UsedAttribute> = None;

    for (family, av, it, cf) in families {
        let (score, cell, attr) = highest_in_family(av, it, cf);
        if score > userisk {
            userisk = score;
            used = Some(UsedAttribute {
                attribute: format!("{attr}-{family}"),
                impact: cell.impact.calc_value(),
                probability: cell.probability.calc_value(),
            });
        }
    }

    used.ok_or_else(|| {
        AppError::Calculation(format!("{}: found no valid attributes", rra.service_name))
    })
}

fn rra_scenario(used: &UsedAttribute) -> RiskScenario {
    let probability = used.probability.min(RRA_PROBABILITY_CAP);
    RiskScenario {
        name: format!("RRA derived risk for {}", used.attribute),
        impact: used.impact,
        probability,
        score: used.impact * probability,
    }
}

/// One scenario per distinct indicator event source observed across the
/// RRA's linked asset groups, using the highest likelihood reported by
/// that source as the scenario's probability.
fn indicator_scenarios(rra: &Rra, used: &UsedAttribute) -> Vec<RiskScenario> {
    let mut by_source: HashMap<&str, f64> = HashMap::new();
    for group in &rra.groups {
        for asset in &group.assets {
            for indicator in &asset.indicators {
                let value = indicator.likelihood.calc_value();
                let entry = by_source.entry(indicator.event_source.as_str()).or_insert(0.0);
                if value > *entry {
                    *entry = value;
                }
            }
        }
    }

    let mut sources: Vec<&str> = by_source.keys().copied().collect();
    sources.sort_unstable();

    sources
        .into_iter()
        .map(|source| {
            let probability = by_source[source];
            RiskScenario {
                name: format!("{source} derived risk for {}", used.attribute),
                impact: used.impact,
                probability,
                score: used.impact * probability,
            }
        })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn worst_case(values: &[f64]) -> f64 {
    values.iter().cloned().fold(0.0, f64::max)
}

/// Exact reverse map for a score known to land on one of the five integer
/// attribute values; unlike [`Label::from_score`] this has no threshold
/// band and falls back to `unknown` for anything below 0.5.
fn exact_label(v: f64) -> Label {
    if v >= 3.5 {
        Label::Maximum
    } else if v >= 2.5 {
        Label::High
    } else if v >= 1.5 {
        Label::Medium
    } else if v >= 0.5 {
        Label::Low
    } else {
        Label::Unknown
    }
}

/// Computes the full risk document for an RRA. `rra.groups` must already
/// be populated with their assets and indicators.
pub fn compute_risk(rra: &Rra) -> Result<RiskDocument, AppError> {
    let used = find_highest_impact(rra)?;

    let mut scenarios = vec![rra_scenario(&used)];
    scenarios.extend(indicator_scenarios(rra, &used));

    let scores: Vec<f64> = scenarios.iter().map(|s| s.score).collect();

    let (median_v, mean_v, worst_v) = if scores.is_empty() {
        tracing::warn!(
            rra = %rra.service_name,
            "error in risk calculation: {} has no valid scenarios",
            rra.service_name
        );
        (0.0, 0.0, 0.0)
    } else {
        (median(&scores), mean(&scores), worst_case(&scores))
    };

    Ok(RiskDocument {
        rra_id: rra.id,
        rra_name: rra.service_name.clone(),
        impact: used.impact,
        impact_label: exact_label(used.impact).to_string(),
        used_attribute: used,
        scenarios,
        median: median_v,
        median_label: Label::from_score(median_v).to_string(),
        average: mean_v,
        average_label: Label::from_score(mean_v).to_string(),
        worst_case: worst_v,
        worst_case_label: Label::from_score(worst_v).to_string(),
        data_classification: rra.default_data_class.value(),
        computed_at: Some(Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetGroup, DataClass};

    fn cell(impact: Label, probability: Label) -> RraCell {
        RraCell { impact, probability }
    }

    fn base_rra() -> Rra {
        Rra {
            id: 1,
            service_name: "widget-api".into(),
            last_updated: Utc::now(),
            default_data_class: DataClass::ConfidentialInternal,
            availability_reputation: cell(Label::Unknown, Label::Unknown),
            availability_productivity: cell(Label::Unknown, Label::Unknown),
            availability_financial: cell(Label::Unknown, Label::Unknown),
            integrity_reputation: cell(Label::Unknown, Label::Unknown),
            integrity_productivity: cell(Label::Unknown, Label::Unknown),
            integrity_financial: cell(Label::Unknown, Label::Unknown),
            confidentiality_reputation: cell(Label::Unknown, Label::Unknown),
            confidentiality_productivity: cell(Label::Unknown, Label::Unknown),
            confidentiality_financial: cell(Label::Unknown, Label::Unknown),
            raw_document: serde_json::Value::Null,
            groups: Vec::new(),
        }
    }

    #[test]
    fn picks_dominant_attribute_by_strict_tie_break() {
        let mut rra = base_rra();
        rra.availability_reputation = cell(Label::High, Label::High);
        rra.confidentiality_reputation = cell(Label::High, Label::High);
        let used = find_highest_impact(&rra).unwrap();
        assert_eq!(used.attribute, "availability-reputation");
    }

    #[test]
    fn all_unknown_cells_still_resolve_via_low_fallback() {
        // Unknown folds to `low` (1.0) in calc_value, so every cell scores
        // 1.0 and the first family/attribute in evaluation order wins.
        let rra = base_rra();
        let used = find_highest_impact(&rra).unwrap();
        assert_eq!(used.attribute, "availability-reputation");
        assert_eq!(used.impact, 1.0);
    }

    #[test]
    fn rra_probability_is_capped_but_indicator_probability_is_not() {
        let mut rra = base_rra();
        rra.availability_reputation = cell(Label::Maximum, Label::Maximum);
        rra.groups.push(AssetGroup {
            id: 1,
            name: "g".into(),
            assets: vec![],
        });
        let doc = compute_risk(&rra).unwrap();
        let rra_scenario = &doc.scenarios[0];
        assert_eq!(rra_scenario.probability, 2.0);
    }

    #[test]
    fn unknown_label_calculates_as_low_not_zero() {
        assert_eq!(Label::Unknown.calc_value(), 1.0);
        assert_eq!(Label::Unknown.raw_value(), 0.0);
    }
}
