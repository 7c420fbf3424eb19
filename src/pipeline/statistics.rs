//! Running statistics derived from one variable each.
//!
//! Cumulative statistics keep O(1) state (`count`, `sum`, `sum_sq`, running
//! extreme). Windowed statistics keep the last `N` raw values and recompute
//! over them on every update.
//!
//! The cumulative standard deviation is the population deviation. The windowed
//! one is the sample deviation (divides by `N - 1`, zero for a single value).

use crate::config::{StatisticConfig, StatisticKind};
use crate::types::Variable;
use std::collections::VecDeque;

/// State accumulated since the start of the run
#[derive(Debug, Clone, PartialEq)]
pub enum RunningState {
    Cumulative {
        count: u64,
        sum: f64,
        sum_sq: f64,
        /// Running min or max
        extreme: Option<f64>,
    },
    Windowed {
        values: VecDeque<f64>,
        size: usize,
    },
}

impl RunningState {
    fn empty(window: Option<usize>) -> Self {
        match window {
            Some(size) => RunningState::Windowed {
                values: VecDeque::with_capacity(size),
                size,
            },
            None => RunningState::Cumulative {
                count: 0,
                sum: 0.0,
                sum_sq: 0.0,
                extreme: None,
            },
        }
    }

    /// Whether no value has been accumulated yet
    pub fn is_empty(&self) -> bool {
        match self {
            RunningState::Cumulative { count, extreme, .. } => *count == 0 && extreme.is_none(),
            RunningState::Windowed { values, .. } => values.is_empty(),
        }
    }
}

/// A statistic bound to its source variable
#[derive(Debug, Clone)]
pub struct Statistic {
    pub name: String,
    pub operation: StatisticKind,
    /// Position of the source variable; `None` when it could not be resolved
    pub source_index: Option<usize>,
    window: Option<usize>,
    state: RunningState,
}

impl Statistic {
    pub fn new(config: &StatisticConfig, variables: &[Variable]) -> Self {
        Self {
            name: config.name.clone(),
            operation: config.operation,
            source_index: variables.iter().position(|v| v.name == config.variable),
            window: config.window,
            state: RunningState::empty(config.window),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.source_index.is_some()
    }

    pub fn state(&self) -> &RunningState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = RunningState::empty(self.window);
    }

    /// Account for a new source value and return the statistic.
    ///
    /// The result may be non-finite (e.g. a negative radicand from rounding
    /// in the cumulative deviation); callers decide what to do with it.
    pub fn update(&mut self, value: f64) -> f64 {
        let operation = self.operation;
        match &mut self.state {
            RunningState::Cumulative {
                count,
                sum,
                sum_sq,
                extreme,
            } => match operation {
                StatisticKind::Min => {
                    let next = extreme.map_or(value, |current| current.min(value));
                    *extreme = Some(next);
                    next
                }
                StatisticKind::Max => {
                    let next = extreme.map_or(value, |current| current.max(value));
                    *extreme = Some(next);
                    next
                }
                StatisticKind::Mean => {
                    *count += 1;
                    *sum += value;
                    *sum / *count as f64
                }
                StatisticKind::Std => {
                    *count += 1;
                    *sum += value;
                    *sum_sq += value * value;
                    let n = *count as f64;
                    let mean = *sum / n;
                    (*sum_sq / n - mean * mean).sqrt()
                }
            },
            RunningState::Windowed { values, size } => {
                values.push_back(value);
                while values.len() > *size {
                    values.pop_front();
                }
                window_statistic(operation, values)
            }
        }
    }
}

fn window_statistic(operation: StatisticKind, values: &VecDeque<f64>) -> f64 {
    let n = values.len() as f64;
    match operation {
        StatisticKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        StatisticKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        StatisticKind::Mean => values.iter().sum::<f64>() / n,
        StatisticKind::Std => {
            if values.len() < 2 {
                return 0.0;
            }
            let mean = values.iter().sum::<f64>() / n;
            let squares = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>();
            (squares / (n - 1.0)).sqrt()
        }
    }
}

/// Result of updating one statistic for a sample group
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatisticOutcome {
    /// A finite value at the source sample's timestamp
    Value { x: f64, y: f64 },
    /// The computation produced a non-finite number
    NotFinite,
    /// Unresolved source variable
    Invalid,
}

/// All statistics of a pipeline, in configuration order
#[derive(Debug, Clone, Default)]
pub struct StatisticsEngine {
    statistics: Vec<Statistic>,
}

impl StatisticsEngine {
    pub fn new(configs: &[StatisticConfig], variables: &[Variable]) -> Self {
        Self {
            statistics: configs.iter().map(|c| Statistic::new(c, variables)).collect(),
        }
    }

    pub fn statistics(&self) -> &[Statistic] {
        &self.statistics
    }

    pub fn len(&self) -> usize {
        self.statistics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }

    /// Names of statistics whose source variable is missing
    pub fn invalid_names(&self) -> Vec<&str> {
        self.statistics
            .iter()
            .filter(|s| !s.is_valid())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Drop all accumulated state
    pub fn reset(&mut self) {
        for statistic in &mut self.statistics {
            statistic.reset();
        }
    }

    /// Update every statistic from the sample values of one group.
    ///
    /// `values` holds `(x, y)` per variable and must be complete.
    pub fn update(&mut self, values: &[(f64, f64)]) -> Vec<StatisticOutcome> {
        self.statistics
            .iter_mut()
            .map(|statistic| {
                let Some((x, value)) = statistic.source_index.and_then(|i| values.get(i)).copied()
                else {
                    return StatisticOutcome::Invalid;
                };
                let y = statistic.update(value);
                if y.is_finite() {
                    StatisticOutcome::Value { x, y }
                } else {
                    StatisticOutcome::NotFinite
                }
            })
            .collect()
    }
}
