//! Pipeline executor, the processing worker loop.
//!
//! The pipeline runs on a dedicated thread and waits on two sources:
//! 1. Commands from the caller ([`PipelineCommand`]).
//! 2. The batch timer, armed only while output is accumulating.
//!
//! For each accepted sample group the executor appends one point per output,
//! in output order: variables, then statistics, then expressions.

use crate::config::{
    default_log_directory, LogFormat, ProcessingConfig, VariableGroupLink,
};
use crate::pipeline::batch::{BatchEmitter, TickOutcome};
use crate::pipeline::bridge::{PipelineCommand, ProcessingStatus, SinkMessage, StatusSeverity};
use crate::pipeline::expression::{
    statistic_identifier, validate_expression, variable_identifier, Validation,
};
use crate::pipeline::packet::{Batch, Frame};
use crate::pipeline::statistics::{StatisticOutcome, StatisticsEngine};
use crate::pipeline::trigger::{RunStart, TriggerGate};
use crate::scripting::{CompiledFormula, FormulaCache, FormulaEngine};
use crate::session::types::LogSessionConfig;
use crate::session::worker::{LogCommand, LogWorkerHandle};
use crate::types::{SampleGroup, Variable};
use crossbeam_channel::{never, select, tick, Receiver, Sender};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// An expression ready for evaluation
struct ActiveExpression {
    name: String,
    validation: Validation,
    /// Present only when validation passed and compilation succeeded
    formula: Option<CompiledFormula>,
}

/// State built by `Initialize`, replaced as a whole on re-initialization
struct ActiveSession {
    config: ProcessingConfig,
    directory: PathBuf,
    variables: Vec<Variable>,
    expressions: Vec<ActiveExpression>,
    variable_ids: Vec<String>,
    statistic_ids: Vec<String>,
}

impl ActiveSession {
    fn logging_enabled(&self) -> bool {
        self.config.logmode.is_enabled()
    }

    fn log_config(&self) -> LogSessionConfig {
        LogSessionConfig::new(&self.directory, &self.config.groupname)
            .with_format(self.config.logmode, self.config.logformat)
            .with_variables(self.variables.iter().map(|v| v.name.clone()))
            .with_decimal_style(self.config.decimal_style)
            .with_max_file_size(self.config.max_file_size)
    }
}

/// The processing worker
pub struct Pipeline {
    cmd_rx: Receiver<PipelineCommand>,
    msg_tx: Sender<SinkMessage>,
    log: LogWorkerHandle,
    engine: FormulaEngine,
    cache: FormulaCache,
    session: Option<ActiveSession>,
    statistics: StatisticsEngine,
    gate: TriggerGate,
    emitter: BatchEmitter,
    /// Batch timer, `None` while idle
    ticker: Option<Receiver<Instant>>,
}

impl Pipeline {
    pub fn new(
        cmd_rx: Receiver<PipelineCommand>,
        msg_tx: Sender<SinkMessage>,
        log: LogWorkerHandle,
    ) -> Self {
        Self {
            cmd_rx,
            msg_tx,
            log,
            engine: FormulaEngine::new(),
            cache: FormulaCache::new(),
            session: None,
            statistics: StatisticsEngine::default(),
            gate: TriggerGate::disabled(),
            emitter: BatchEmitter::new("", Vec::<String>::new(), false),
            ticker: None,
        }
    }

    /// Main loop. Runs until `Shutdown` or until the caller is gone.
    pub fn run(mut self) {
        tracing::info!("Pipeline thread started");
        let cmd_rx = self.cmd_rx.clone();

        loop {
            let ticker = self.ticker.clone().unwrap_or_else(never);
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::info!("Command channel closed");
                        self.shutdown();
                        break;
                    }
                },
                recv(ticker) -> _ => self.on_tick(),
            }
        }

        tracing::info!("Pipeline thread exiting");
    }

    /// Process one command. Returns false once the pipeline has shut down.
    pub fn handle_command(&mut self, cmd: PipelineCommand) -> bool {
        match cmd {
            PipelineCommand::Initialize {
                config,
                directory,
                linked,
            } => self.initialize(*config, directory, linked),
            PipelineCommand::Input(group) => self.handle_input(&group),
            PipelineCommand::Stop => {
                self.flush();
                self.emitter.stop();
                self.ticker = None;
                self.log.send(LogCommand::Stop);
            }
            PipelineCommand::Clear => self.log.send(LogCommand::Clear),
            PipelineCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    // ── Initialization ──

    fn initialize(
        &mut self,
        config: ProcessingConfig,
        directory: Option<PathBuf>,
        linked: Option<VariableGroupLink>,
    ) {
        self.flush();
        self.ticker = None;
        self.session = None;
        self.statistics = StatisticsEngine::default();
        self.gate = TriggerGate::disabled();
        self.emitter = BatchEmitter::new(&config.groupname, Vec::<String>::new(), false);

        if let Err(e) = config.validate() {
            tracing::warn!("Rejected processing configuration: {}", e);
            self.send_status(StatusSeverity::Off, format!("processing off - {}", e));
            self.log.send(LogCommand::Stop);
            return;
        }

        let Some(link) = linked else {
            self.send_status(
                StatusSeverity::Off,
                format!(
                    "processing off - {} variable node not present or disable",
                    config.groupname
                ),
            );
            self.log.send(LogCommand::Stop);
            return;
        };

        let variables = link.merged_variables();
        self.statistics = StatisticsEngine::new(&config.statistics, &variables);
        self.gate = TriggerGate::new(&link.trigger, link.acquisition_mode, &variables);
        self.cache.clear();

        let mut expressions = Vec::with_capacity(config.expressions.len());
        for expression in &config.expressions {
            let validation = validate_expression(
                &self.engine,
                &variables,
                &config.statistics,
                &expression.formula,
            );
            let formula = if validation.ok {
                match self
                    .engine
                    .compile(&mut self.cache, &validation.rewritten_formula)
                {
                    Ok(formula) => Some(formula),
                    Err(e) => {
                        tracing::warn!(name = %expression.name, "Failed to compile expression: {}", e);
                        None
                    }
                }
            } else {
                None
            };
            expressions.push(ActiveExpression {
                name: expression.name.clone(),
                validation,
                formula,
            });
        }

        let invalid: Vec<&str> = self
            .statistics
            .invalid_names()
            .into_iter()
            .chain(
                expressions
                    .iter()
                    .filter(|e| e.formula.is_none())
                    .map(|e| e.name.as_str()),
            )
            .collect();

        let (severity, text) = if !invalid.is_empty() {
            (
                StatusSeverity::Off,
                format!(
                    "processing off - following outputs not valid : {}",
                    invalid.join(", ")
                ),
            )
        } else if link.group_name != config.groupname {
            (
                StatusSeverity::Degraded,
                "processing on but variable node name has been changed".to_string(),
            )
        } else {
            (StatusSeverity::Ok, "processing on".to_string())
        };

        let outputs: Vec<String> = variables
            .iter()
            .map(|v| v.name.clone())
            .chain(self.statistics.statistics().iter().map(|s| s.name.clone()))
            .chain(expressions.iter().map(|e| e.name.clone()))
            .collect();
        self.emitter = BatchEmitter::new(
            &config.groupname,
            outputs,
            config.logformat == LogFormat::Csvc && config.logmode.is_enabled(),
        );

        let session = ActiveSession {
            variable_ids: (0..variables.len()).map(variable_identifier).collect(),
            statistic_ids: (0..config.statistics.len())
                .map(statistic_identifier)
                .collect(),
            directory: directory.unwrap_or_else(default_log_directory),
            config,
            variables,
            expressions,
        };

        tracing::info!(
            group = %session.config.groupname,
            variables = session.variables.len(),
            statistics = self.statistics.len(),
            expressions = session.expressions.len(),
            "Pipeline initialized"
        );

        if session.logging_enabled() {
            self.log.send(LogCommand::Initialize(session.log_config()));
        } else {
            self.log.send(LogCommand::Stop);
        }
        self.session = Some(session);
        self.send_status(severity, text);
    }

    // ── Sample processing ──

    fn handle_input(&mut self, group: &SampleGroup) {
        let Some(session) = self.session.as_ref() else {
            tracing::trace!(group = %group.groupname, "Input ignored, processing disabled");
            return;
        };
        if group.groupname != session.config.groupname {
            tracing::trace!(group = %group.groupname, "Input ignored, group mismatch");
            return;
        }

        if group.first {
            if session.logging_enabled() {
                self.log.send(LogCommand::Initialize(session.log_config()));
            }
            self.statistics.reset();
            match self.gate.begin_run() {
                RunStart::Armed => {
                    if let Some(x) = group.timestamp() {
                        self.send(SinkMessage::RunStarted { x });
                    }
                }
                RunStart::MissingVariable => self.send(SinkMessage::Warning(
                    "trigger variable is not available in the list".to_string(),
                )),
                RunStart::Ungated => {}
            }
        }

        if !self.gate.accept(group) {
            return;
        }

        if self.emitter.start() {
            let interval = Duration::from_millis(session.config.tick_interval_ms);
            self.ticker = Some(tick(interval));
        }

        let variable_count = session.variables.len();
        let sample_values: Vec<Option<(f64, f64)>> = (0..variable_count)
            .map(|i| group.samples.get(i).and_then(|s| s.value().map(|y| (s.x, y))))
            .collect();

        for (index, value) in sample_values.iter().enumerate() {
            if let Some((x, y)) = value {
                self.emitter.push(index, *x, *y);
            }
        }
        if let Some(x) = group.timestamp() {
            self.emitter.push_frame(Frame {
                x,
                values: sample_values.iter().map(|v| v.map(|(_, y)| y)).collect(),
            });
        }

        // Derived outputs need every variable of the group
        let Some(values) = sample_values.into_iter().collect::<Option<Vec<_>>>() else {
            return;
        };
        let statistic_values = self.update_statistics(variable_count, &values);
        self.evaluate_expressions(variable_count, &values, &statistic_values, group);
    }

    /// Update statistics and append their points. Returns one value per
    /// statistic, NaN where there is none.
    fn update_statistics(&mut self, offset: usize, values: &[(f64, f64)]) -> Vec<f64> {
        let outcomes = self.statistics.update(values);
        let mut result = Vec::with_capacity(outcomes.len());

        for (j, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                StatisticOutcome::Value { x, y } => {
                    self.emitter.push(offset + j, x, y);
                    result.push(y);
                }
                StatisticOutcome::NotFinite => {
                    let name = self
                        .statistics
                        .statistics()
                        .get(j)
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    self.send(SinkMessage::Warning(format!(
                        "statistic {} is not a number",
                        name
                    )));
                    result.push(f64::NAN);
                }
                StatisticOutcome::Invalid => result.push(f64::NAN),
            }
        }
        result
    }

    fn evaluate_expressions(
        &mut self,
        variable_count: usize,
        values: &[(f64, f64)],
        statistic_values: &[f64],
        group: &SampleGroup,
    ) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let offset = variable_count + statistic_values.len();
        let mut points = Vec::new();
        let mut warnings = Vec::new();

        for (k, expression) in session.expressions.iter().enumerate() {
            let Some(formula) = expression.formula.as_ref() else {
                continue;
            };
            let inputs = session
                .variable_ids
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(|(_, y)| *y))
                .chain(
                    session
                        .statistic_ids
                        .iter()
                        .map(String::as_str)
                        .zip(statistic_values.iter().copied()),
                );

            match self.engine.evaluate(formula, inputs) {
                Ok(y) if y.is_finite() => {
                    let x = values
                        .get(expression.validation.first_referenced_index)
                        .map(|(x, _)| *x)
                        .or_else(|| group.timestamp());
                    if let Some(x) = x {
                        points.push((offset + k, x, y));
                    }
                }
                Ok(_) => warnings.push(format!("expression {} is not a number", expression.name)),
                Err(e) => {
                    tracing::debug!(name = %expression.name, "Expression failed: {}", e);
                    warnings.push(format!("expression {} failed: {}", expression.name, e));
                }
            }
        }

        for (index, x, y) in points {
            self.emitter.push(index, x, y);
        }
        for warning in warnings {
            self.send(SinkMessage::Warning(warning));
        }
    }

    // ── Batching ──

    /// Handle one tick of the batch timer
    pub fn on_tick(&mut self) {
        match self.emitter.on_tick() {
            TickOutcome::Idle => {
                tracing::trace!("Batch timer idle");
                self.ticker = None;
            }
            TickOutcome::Flush(batch) => self.dispatch(batch),
        }
    }

    /// Send whatever is pending without waiting for the timer
    fn flush(&mut self) {
        if self.emitter.is_empty() {
            return;
        }
        if let TickOutcome::Flush(batch) = self.emitter.on_tick() {
            self.dispatch(batch);
        }
    }

    fn dispatch(&mut self, batch: Batch) {
        let logging = self
            .session
            .as_ref()
            .is_some_and(ActiveSession::logging_enabled);

        if logging {
            if !batch.buffers.is_empty() {
                self.send(SinkMessage::Data(batch.buffers.clone()));
            }
            self.log.send(LogCommand::Log(batch));
        } else if !batch.buffers.is_empty() {
            self.send(SinkMessage::Data(batch.buffers));
        }
    }

    fn shutdown(&mut self) {
        self.flush();
        self.ticker = None;
        self.log.shutdown();
        self.send(SinkMessage::Shutdown);
    }

    // ── Messaging ──

    fn send_status(&self, severity: StatusSeverity, text: String) {
        tracing::info!(?severity, "{}", text);
        self.send(SinkMessage::Status(ProcessingStatus::new(severity, text)));
    }

    fn send(&self, msg: SinkMessage) {
        if self.msg_tx.send(msg).is_err() {
            tracing::debug!("Message dropped, receiver gone");
        }
    }
}
