//! Rhai Formula Engine for Expressions
//!
//! Expressions are single Rhai expressions evaluated over a scope of named
//! numeric inputs. Inputs are pushed as `f64`; integer literals stay `i64`.
//!
//! ## Operators
//!
//! - Arithmetic: `+ - * / %`, power `**`. Division is always real, so `1/2`
//!   is `0.5`.
//! - Comparison: `== != < <= > >=` (booleans evaluate to `1` / `0`)
//! - Bitwise: `& | ^ ~ << >>` on 64-bit integers. Real operands are truncated
//!   toward zero and must fit in an `i64`; shift amounts must be in `0..64`.
//!
//! Note that `^` is exclusive-or, not power.
//!
//! ## Bit Helpers
//!
//! - `bit_not(a)` - Bitwise complement
//! - `read_bit(a, n)` - Bit `n` of `a` (`0` or `1`)
//! - `set_bit(a, n)` - `a` with bit `n` set
//! - `clear_bit(a, n)` - `a` with bit `n` cleared
//!
//! ## Math Functions
//!
//! `abs`, `sqrt`, `pow`, `exp`, `ln`, `log10`, `sin`, `cos`, `tan`, `floor`,
//! `ceil`, `round`, `min`, `max`, `clamp`
//!
//! ## Example Formulas
//!
//! Extracting a status nibble:
//! ```rhai
//! (status >> 4) & 0xF
//! ```
//!
//! Inverted alarm bits:
//! ```rhai
//! ~alarms & 0xFF
//! ```
//!
//! Power from voltage and current:
//! ```rhai
//! voltage * current
//! ```

mod engine;

pub use engine::FormulaEngine;

use crate::error::{Result, VarLogError};
use rhai::{Engine, AST};
use std::collections::HashMap;

/// A compiled formula that can be evaluated repeatedly
#[derive(Clone)]
pub struct CompiledFormula {
    ast: AST,
    source: String,
}

impl CompiledFormula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFormula")
            .field("source", &self.source)
            .finish()
    }
}

/// Cache of compiled formulas keyed by source text
#[derive(Default)]
pub struct FormulaCache {
    cache: HashMap<String, CompiledFormula>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached formula or compile and cache it
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<CompiledFormula> {
        if let Some(formula) = self.cache.get(source) {
            return Ok(formula.clone());
        }

        let ast = engine
            .compile_expression(source)
            .map_err(|e| VarLogError::Formula(format!("Compilation error: {}", e)))?;

        let formula = CompiledFormula {
            ast,
            source: source.to_string(),
        };
        self.cache.insert(source.to_string(), formula.clone());
        Ok(formula)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_cache() {
        let engine = FormulaEngine::new();
        let mut cache = FormulaCache::new();

        let first = cache.get_or_compile(engine.engine(), "a * 2.0").unwrap();
        let second = cache.get_or_compile(engine.engine(), "a * 2.0").unwrap();
        assert_eq!(first.source(), second.source());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_rejects_statements() {
        let engine = FormulaEngine::new();
        let mut cache = FormulaCache::new();
        assert!(cache.get_or_compile(engine.engine(), "let x = 1; x").is_err());
        assert!(cache.is_empty());
    }
}
