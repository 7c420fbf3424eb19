//! Expression validation.
//!
//! User formulas reference variables and statistics by their display names,
//! which may contain characters that are not valid identifiers (`motor.speed`,
//! `buf[2]`). Before evaluation every name is replaced with a positional safe
//! identifier, then the rewritten formula is proven to evaluate over two probe
//! scopes: one with every input at `1`, one with independent random reals.

use crate::config::StatisticConfig;
use crate::error::VarLogError;
use crate::scripting::FormulaEngine;
use crate::types::Variable;
use rand::Rng;

/// Prefix of the safe identifier of variable `i`
pub const VARIABLE_PREFIX: &str = "input_slot_";

/// Prefix of the safe identifier of statistic `j`
pub const STATISTIC_PREFIX: &str = "stat_slot_";

pub fn variable_identifier(index: usize) -> String {
    format!("{}{}", VARIABLE_PREFIX, index)
}

pub fn statistic_identifier(index: usize) -> String {
    format!("{}{}", STATISTIC_PREFIX, index)
}

/// Outcome of validating one formula
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub ok: bool,
    /// Formula with every name replaced by its safe identifier
    pub rewritten_formula: String,
    /// Variable whose timestamp the expression's points carry
    pub first_referenced_index: usize,
    /// Reason the formula was rejected
    pub error: Option<String>,
}

impl Validation {
    fn rejected(rewritten_formula: String, first_referenced_index: usize, error: String) -> Self {
        Self {
            ok: false,
            rewritten_formula,
            first_referenced_index,
            error: Some(error),
        }
    }
}

struct Candidate {
    name: String,
    identifier: String,
    /// Variable the name resolves to for timestamp alignment
    variable_index: usize,
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace every name in `formula` with its identifier.
///
/// Candidates must be sorted longest first. Names only match at identifier
/// boundaries. Returns the rewritten text and the variable index of the
/// leftmost reference.
fn substitute(formula: &str, candidates: &[Candidate]) -> (String, Option<usize>) {
    let mut rewritten = String::with_capacity(formula.len());
    let mut first_reference = None;
    let mut previous: Option<char> = None;
    let mut rest = formula;

    while let Some(c) = rest.chars().next() {
        let at_boundary = !previous.is_some_and(is_identifier_char);
        let matched = at_boundary
            .then(|| {
                candidates.iter().find(|candidate| {
                    rest.strip_prefix(candidate.name.as_str())
                        .is_some_and(|after| !after.chars().next().is_some_and(is_identifier_char))
                })
            })
            .flatten();

        match matched {
            Some(candidate) => {
                rewritten.push_str(&candidate.identifier);
                first_reference.get_or_insert(candidate.variable_index);
                previous = candidate.name.chars().last();
                rest = &rest[candidate.name.len()..];
            }
            None => {
                rewritten.push(c);
                previous = Some(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    (rewritten, first_reference)
}

/// Validate a formula against the configured variables and statistics.
///
/// Statistics whose source variable does not exist are not valid references.
pub fn validate_expression(
    engine: &FormulaEngine,
    variables: &[Variable],
    statistics: &[StatisticConfig],
    formula: &str,
) -> Validation {
    let mut candidates: Vec<Candidate> = variables
        .iter()
        .enumerate()
        .map(|(i, v)| Candidate {
            name: v.name.clone(),
            identifier: variable_identifier(i),
            variable_index: i,
        })
        .collect();
    candidates.extend(statistics.iter().enumerate().filter_map(|(j, s)| {
        let source = variables.iter().position(|v| v.name == s.variable)?;
        Some(Candidate {
            name: s.name.clone(),
            identifier: statistic_identifier(j),
            variable_index: source,
        })
    }));
    candidates.retain(|c| !c.name.is_empty());
    candidates.sort_by(|a, b| b.name.len().cmp(&a.name.len()));

    let (rewritten, first_reference) = substitute(formula, &candidates);
    let first_referenced_index = first_reference.unwrap_or(0);

    let mut rng = rand::thread_rng();
    let ones: Vec<(&str, f64)> = candidates
        .iter()
        .map(|c| (c.identifier.as_str(), 1.0))
        .collect();
    let random: Vec<(&str, f64)> = candidates
        .iter()
        .map(|c| (c.identifier.as_str(), rng.gen::<f64>()))
        .collect();

    for probe in [ones, random] {
        if let Err(e) = engine.eval(&rewritten, probe) {
            let error = VarLogError::Validation(e.to_string());
            tracing::debug!(formula, %error, "Expression rejected");
            return Validation::rejected(rewritten, first_referenced_index, error.to_string());
        }
    }

    Validation {
        ok: true,
        rewritten_formula: rewritten,
        first_referenced_index,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatisticKind;
    use crate::types::VariableType;

    fn variables(names: &[&str]) -> Vec<Variable> {
        names
            .iter()
            .map(|n| Variable::new(*n, VariableType::F32))
            .collect()
    }

    #[test]
    fn test_rejects_unknown_name() {
        let engine = FormulaEngine::new();
        let validation =
            validate_expression(&engine, &variables(&["speed"]), &[], "UnknownVar + 1");
        assert!(!validation.ok);
        let error = validation.error.unwrap_or_default();
        assert!(error.starts_with("Validation error:"), "{}", error);
        assert!(error.contains("UnknownVar"), "{}", error);
    }

    #[test]
    fn test_longer_name_wins() {
        let engine = FormulaEngine::new();
        let vars = variables(&["speed", "speed_max"]);
        let validation = validate_expression(&engine, &vars, &[], "speed_max - speed");
        assert!(validation.ok);
        assert_eq!(validation.rewritten_formula, "input_slot_1 - input_slot_0");
        assert_eq!(validation.first_referenced_index, 1);
    }

    #[test]
    fn test_dotted_names() {
        let engine = FormulaEngine::new();
        let vars = variables(&["motor.speed", "speed"]);
        let validation = validate_expression(&engine, &vars, &[], "speed + motor.speed * 2");
        assert!(validation.ok);
        assert_eq!(
            validation.rewritten_formula,
            "input_slot_1 + input_slot_0 * 2"
        );
        assert_eq!(validation.first_referenced_index, 1);
    }

    #[test]
    fn test_name_inside_identifier_is_not_replaced() {
        let engine = FormulaEngine::new();
        let vars = variables(&["a"]);
        let validation = validate_expression(&engine, &vars, &[], "abs(a)");
        assert!(validation.ok);
        assert_eq!(validation.rewritten_formula, "abs(input_slot_0)");
    }

    #[test]
    fn test_statistic_maps_to_source_index() {
        let engine = FormulaEngine::new();
        let vars = variables(&["a", "b"]);
        let stats = vec![StatisticConfig::cumulative("b_avg", "b", StatisticKind::Mean)];
        let validation = validate_expression(&engine, &vars, &stats, "b_avg * 2 + a");
        assert!(validation.ok);
        assert_eq!(validation.rewritten_formula, "stat_slot_0 * 2 + input_slot_0");
        assert_eq!(validation.first_referenced_index, 1);
    }

    #[test]
    fn test_invalid_statistic_is_not_a_reference() {
        let engine = FormulaEngine::new();
        let vars = variables(&["a"]);
        let stats = vec![StatisticConfig::cumulative("lost", "gone", StatisticKind::Max)];
        let validation = validate_expression(&engine, &vars, &stats, "lost + a");
        assert!(!validation.ok);
    }

    #[test]
    fn test_default_index_without_reference() {
        let engine = FormulaEngine::new();
        let validation = validate_expression(&engine, &variables(&["a", "b"]), &[], "42");
        assert!(validation.ok);
        assert_eq!(validation.first_referenced_index, 0);
    }

    #[test]
    fn test_accepts_unary_complement() {
        let engine = FormulaEngine::new();
        let validation = validate_expression(&engine, &variables(&["A"]), &[], "~A & 0xFF");
        assert!(validation.ok, "{:?}", validation.error);
        assert_eq!(validation.rewritten_formula, "~input_slot_0 & 0xFF");
        assert_eq!(
            engine
                .eval(&validation.rewritten_formula, [("input_slot_0", 0x0F as f64)])
                .unwrap(),
            240.0
        );
    }

    #[test]
    fn test_integer_division_is_not_truncated() {
        let engine = FormulaEngine::new();
        let validation = validate_expression(&engine, &variables(&["speed"]), &[], "speed * (1/2)");
        assert!(validation.ok);
        assert_eq!(
            engine
                .eval(&validation.rewritten_formula, [("input_slot_0", 10.0)])
                .unwrap(),
            5.0
        );
    }

    #[test]
    fn test_rejects_syntax_error() {
        let engine = FormulaEngine::new();
        let validation = validate_expression(&engine, &variables(&["a"]), &[], "a +");
        assert!(!validation.ok);
    }
}
