//! Rhai Formula Engine Implementation
//!
//! Bitwise operators are evaluated on native `i64` values. Rhai already
//! handles `INT op INT`; the overloads registered here cover every pairing
//! with a real operand, which is what formula inputs always are.
//!
//! Division, remainder and power between two integers produce reals, so
//! `1/2` is `0.5`. Unary `~` is rewritten to `bit_not` before compiling.

use crate::error::{Result, ResultExt, VarLogError};
use crate::scripting::{CompiledFormula, FormulaCache};
use rhai::{Dynamic, Engine, EvalAltResult, Scope, INT};

type BitResult = std::result::Result<INT, Box<EvalAltResult>>;

/// Convert a real operand to a 64-bit integer, truncating toward zero
fn to_bits(value: f64) -> BitResult {
    if !value.is_finite() {
        return Err(format!("bitwise operand {} is not a finite number", value).into());
    }
    let truncated = value.trunc();
    // 2^63 is the first value that no longer fits
    if truncated < i64::MIN as f64 || truncated >= 9_223_372_036_854_775_808.0 {
        return Err(format!("bitwise operand {} does not fit in 64 bits", value).into());
    }
    Ok(truncated as INT)
}

/// Integer view of any numeric Rhai value
fn operand(value: &Dynamic) -> BitResult {
    if let Ok(i) = value.as_int() {
        Ok(i)
    } else if let Ok(f) = value.as_float() {
        to_bits(f)
    } else if let Ok(b) = value.as_bool() {
        Ok(INT::from(b))
    } else {
        Err(format!("bitwise operand of type {} is not a number", value.type_name()).into())
    }
}

fn shift_amount(amount: INT) -> std::result::Result<u32, Box<EvalAltResult>> {
    u32::try_from(amount)
        .ok()
        .filter(|n| *n < INT::BITS)
        .ok_or_else(|| format!("shift amount {} is outside 0..64", amount).into())
}

fn shift_left(a: INT, b: INT) -> BitResult {
    let n = shift_amount(b)?;
    a.checked_shl(n)
        .ok_or_else(|| format!("cannot shift {} left by {}", a, b).into())
}

fn shift_right(a: INT, b: INT) -> BitResult {
    let n = shift_amount(b)?;
    a.checked_shr(n)
        .ok_or_else(|| format!("cannot shift {} right by {}", a, b).into())
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Length of the parenthesized group opening `text`, or all of it when unbalanced
fn group_len(text: &str) -> usize {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    text.len()
}

/// End of the operand of a prefix operator at the start of `text`.
///
/// An operand is any further prefix operators followed by a name or number,
/// a function call or a parenthesized group.
fn operand_end(text: &str) -> usize {
    let start = text
        .find(|c: char| !(c.is_whitespace() || matches!(c, '~' | '-' | '+' | '!')))
        .unwrap_or(text.len());
    let atom = text[start..]
        .find(|c: char| !(is_identifier_char(c) || c == '.'))
        .map_or(text.len(), |len| start + len);
    if text[atom..].starts_with('(') {
        atom + group_len(&text[atom..])
    } else {
        atom
    }
}

/// Rewrite every unary `~operand` as `bit_not(operand)`
pub(crate) fn expand_complement(source: &str) -> String {
    let mut expanded = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(pos) = rest.find('~') {
        expanded.push_str(&rest[..pos]);
        let operand = &rest[pos + 1..];
        let end = operand_end(operand);
        expanded.push_str("bit_not(");
        expanded.push_str(&expand_complement(&operand[..end]));
        expanded.push(')');
        rest = &operand[end..];
    }
    expanded.push_str(rest);
    expanded
}

/// Register an integer operator for every pairing with a real operand
fn register_bitwise(engine: &mut Engine, op: &str, apply: fn(INT, INT) -> BitResult) {
    engine.register_fn(op, move |a: f64, b: f64| apply(to_bits(a)?, to_bits(b)?));
    engine.register_fn(op, move |a: INT, b: f64| apply(a, to_bits(b)?));
    engine.register_fn(op, move |a: f64, b: INT| apply(to_bits(a)?, b));
}

/// Engine evaluating user formulas over named numeric inputs
pub struct FormulaEngine {
    engine: Engine,
}

impl FormulaEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);
        Self { engine }
    }

    fn configure_engine(engine: &mut Engine) {
        // Set safety limits
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(1_000);
        engine.set_max_array_size(100);
        engine.set_max_map_size(100);

        // Built-in integer operators would otherwise shadow the overloads below
        engine.set_fast_operators(false);

        // ===== Real Division =====

        engine.register_fn("/", |a: INT, b: INT| a as f64 / b as f64);
        engine.register_fn("%", |a: INT, b: INT| a as f64 % b as f64);
        engine.register_fn("**", |a: INT, b: INT| (a as f64).powf(b as f64));

        // ===== Bitwise Operators =====

        register_bitwise(engine, "&", |a, b| Ok(a & b));
        register_bitwise(engine, "|", |a, b| Ok(a | b));
        register_bitwise(engine, "^", |a, b| Ok(a ^ b));
        register_bitwise(engine, "<<", shift_left);
        register_bitwise(engine, ">>", shift_right);

        engine.register_fn("bit_not", |a: Dynamic| -> BitResult { Ok(!operand(&a)?) });
        engine.register_fn("read_bit", |a: Dynamic, n: Dynamic| -> BitResult {
            let bit = shift_amount(operand(&n)?)?;
            Ok((operand(&a)? >> bit) & 1)
        });
        engine.register_fn("set_bit", |a: Dynamic, n: Dynamic| -> BitResult {
            let bit = shift_amount(operand(&n)?)?;
            Ok(operand(&a)? | ((1 as INT) << bit))
        });
        engine.register_fn("clear_bit", |a: Dynamic, n: Dynamic| -> BitResult {
            let bit = shift_amount(operand(&n)?)?;
            Ok(operand(&a)? & !((1 as INT) << bit))
        });

        // ===== Mathematical Functions =====

        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("exp", |x: f64| x.exp());
        engine.register_fn("ln", |x: f64| x.ln());
        engine.register_fn("log10", |x: f64| x.log10());
        engine.register_fn("sin", |x: f64| x.sin());
        engine.register_fn("cos", |x: f64| x.cos());
        engine.register_fn("tan", |x: f64| x.tan());

        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("pow", |x: f64, y: INT| x.powf(y as f64));
        engine.register_fn("pow", |x: INT, y: f64| (x as f64).powf(y));
        engine.register_fn("pow", |x: INT, y: INT| (x as f64).powf(y as f64));

        // Rounding functions
        engine.register_fn("floor", |x: f64| x.floor());
        engine.register_fn("ceil", |x: f64| x.ceil());
        engine.register_fn("round", |x: f64| x.round());

        // Clamping and limiting
        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.max(min).min(max));
        engine.register_fn("min", |a: f64, b: f64| a.min(b));
        engine.register_fn("min", |a: f64, b: INT| a.min(b as f64));
        engine.register_fn("min", |a: INT, b: f64| (a as f64).min(b));
        engine.register_fn("max", |a: f64, b: f64| a.max(b));
        engine.register_fn("max", |a: f64, b: INT| a.max(b as f64));
        engine.register_fn("max", |a: INT, b: f64| (a as f64).max(b));
    }

    /// Compile a formula through a cache
    pub fn compile(&self, cache: &mut FormulaCache, source: &str) -> Result<CompiledFormula> {
        if source.contains('~') {
            cache.get_or_compile(&self.engine, &expand_complement(source))
        } else {
            cache.get_or_compile(&self.engine, source)
        }
    }

    /// Evaluate a compiled formula with the given named inputs
    pub fn evaluate<'a, I>(&self, formula: &CompiledFormula, inputs: I) -> Result<f64>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut scope = Scope::new();
        for (name, value) in inputs {
            scope.push(name, value);
        }

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, formula.ast())
            .context("Execution error")?;

        Self::to_number(result)
    }

    /// Compile and evaluate a formula in one step
    pub fn eval<'a, I>(&self, source: &str, inputs: I) -> Result<f64>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut cache = FormulaCache::new();
        let formula = self.compile(&mut cache, source)?;
        self.evaluate(&formula, inputs)
    }

    fn to_number(value: Dynamic) -> Result<f64> {
        if let Ok(f) = value.as_float() {
            Ok(f)
        } else if let Ok(i) = value.as_int() {
            Ok(i as f64)
        } else if let Ok(b) = value.as_bool() {
            Ok(if b { 1.0 } else { 0.0 })
        } else {
            Err(VarLogError::Formula(format!(
                "Formula must return a number, got {}",
                value.type_name()
            )))
        }
    }

    /// Get a reference to the underlying Rhai engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eval(source: &str, inputs: &[(&str, f64)]) -> Result<f64> {
        FormulaEngine::new().eval(source, inputs.iter().copied())
    }

    #[test]
    fn test_and_above_31_bits() {
        let a = 0x8000_0005u64 as f64;
        let b = 0xF0 as f64;
        assert_eq!(eval("A&B", &[("A", a), ("B", b)]).unwrap(), 0.0);
        assert_eq!(
            eval("A | B", &[("A", a), ("B", b)]).unwrap(),
            0x8000_00F5u64 as f64
        );
    }

    #[test]
    fn test_mixed_literal_operands() {
        let status = 0xABCD_1234u64 as f64;
        assert_eq!(eval("status & 0xFF", &[("status", status)]).unwrap(), 0x34 as f64);
        assert_eq!(eval("(status >> 28) & 0xF", &[("status", status)]).unwrap(), 0xA as f64);
        assert_eq!(eval("1 << n", &[("n", 40.0)]).unwrap(), (1u64 << 40) as f64);
    }

    #[test]
    fn test_reals_truncate_toward_zero() {
        assert_eq!(eval("a & 0xF", &[("a", 7.9)]).unwrap(), 7.0);
        assert_eq!(eval("a | 0", &[("a", -2.5)]).unwrap(), -2.0);
    }

    #[test]
    fn test_bitwise_rejects_out_of_range() {
        assert!(eval("a & 1", &[("a", f64::INFINITY)]).is_err());
        assert!(eval("a & 1", &[("a", 1e20)]).is_err());
        assert!(eval("a << 64", &[("a", 1.0)]).is_err());
        assert!(eval("a >> b", &[("a", 1.0), ("b", -1.0)]).is_err());
    }

    #[test]
    fn test_bit_helpers() {
        assert_eq!(eval("read_bit(a, 31)", &[("a", 0x8000_0000u64 as f64)]).unwrap(), 1.0);
        assert_eq!(eval("read_bit(a, 0)", &[("a", 2.0)]).unwrap(), 0.0);
        assert_eq!(eval("set_bit(a, 4)", &[("a", 1.0)]).unwrap(), 17.0);
        assert_eq!(eval("clear_bit(a, 0)", &[("a", 3.0)]).unwrap(), 2.0);
        assert_eq!(eval("bit_not(a) & 0xFF", &[("a", 0x0F as f64)]).unwrap(), 240.0);
    }

    #[test]
    fn test_arithmetic_and_math() {
        assert_eq!(eval("a * b + 1", &[("a", 2.0), ("b", 3.5)]).unwrap(), 8.0);
        assert_eq!(eval("a ** 2", &[("a", 3.0)]).unwrap(), 9.0);
        assert_eq!(eval("max(a, 0)", &[("a", -4.0)]).unwrap(), 0.0);
        assert_eq!(eval("sqrt(a)", &[("a", 16.0)]).unwrap(), 4.0);
        assert_eq!(eval("a > 1", &[("a", 2.0)]).unwrap(), 1.0);
    }

    #[test]
    fn test_integer_division_is_real() {
        assert_eq!(eval("a * (1/2)", &[("a", 10.0)]).unwrap(), 5.0);
        assert_eq!(eval("1/4", &[]).unwrap(), 0.25);
        assert_eq!(eval("a*3/4 + 1/4", &[("a", 1.0)]).unwrap(), 1.0);
        assert_eq!(eval("7 % 4", &[]).unwrap(), 3.0);
        assert_eq!(eval("2 ** -1", &[]).unwrap(), 0.5);
        assert!(eval("1 / 0", &[]).unwrap().is_infinite());
    }

    #[test]
    fn test_bitwise_results_divide_as_reals() {
        assert_eq!(eval("(a & 0xF) / 2", &[("a", 0x13 as f64)]).unwrap(), 1.5);
        assert_eq!(eval("(a >> 1) + 1", &[("a", 8.0)]).unwrap(), 5.0);
    }

    #[test]
    fn test_unary_complement() {
        assert_eq!(eval("~A & 0xFF", &[("A", 0x0F as f64)]).unwrap(), 240.0);
        assert_eq!(eval("~(A | 1) & 0xF", &[("A", 4.0)]).unwrap(), 10.0);
        assert_eq!(eval("~~A", &[("A", 6.0)]).unwrap(), 6.0);
        assert_eq!(eval("~ abs(A) & 3", &[("A", -1.0)]).unwrap(), 2.0);
        assert_eq!(eval("B & ~0x1", &[("B", 7.0)]).unwrap(), 6.0);
    }

    #[test]
    fn test_expand_complement() {
        assert_eq!(expand_complement("~a & 0xFF"), "bit_not(a) & 0xFF");
        assert_eq!(expand_complement("~(a|b)"), "bit_not((a|b))");
        assert_eq!(expand_complement("~~a"), "bit_not(bit_not(a))");
        assert_eq!(expand_complement("x + ~f(y, ~z)"), "x + bit_not(f(y, bit_not(z)))");
        assert_eq!(expand_complement("a + b"), "a + b");
    }

    #[test]
    fn test_unknown_variable_is_error() {
        assert!(eval("UnknownVar + 1", &[("a", 1.0)]).is_err());
    }

    #[test]
    fn test_non_numeric_result_is_error() {
        assert!(eval("\"text\"", &[]).is_err());
    }

    #[test]
    fn test_division_by_zero_is_not_finite() {
        let result = eval("a / b", &[("a", 1.0), ("b", 0.0)]).unwrap();
        assert!(!result.is_finite());
    }

    proptest! {
        #[test]
        fn prop_bitwise_matches_native(a in 0u64..(1u64 << 52), b in 0u64..(1u64 << 52)) {
            let inputs = [("A", a as f64), ("B", b as f64)];
            prop_assert_eq!(eval("A & B", &inputs).unwrap(), (a & b) as f64);
            prop_assert_eq!(eval("A | B", &inputs).unwrap(), (a | b) as f64);
            prop_assert_eq!(eval("A ^ B", &inputs).unwrap(), (a ^ b) as f64);
        }

        #[test]
        fn prop_shift_matches_native(a in 0u64..(1u64 << 40), n in 0u32..12) {
            let inputs = [("A", a as f64), ("N", n as f64)];
            prop_assert_eq!(eval("A << N", &inputs).unwrap(), (a << n) as f64);
            prop_assert_eq!(eval("A >> N", &inputs).unwrap(), (a >> n) as f64);
        }
    }
}
