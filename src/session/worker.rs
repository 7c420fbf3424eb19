//! Logging worker thread.
//!
//! Owns the log session of one pipeline. All failures are reported as
//! [`SinkMessage::Error`] and the worker keeps accepting commands.

use crate::pipeline::bridge::SinkMessage;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::packet::Batch;
use crate::session::rotation::{Clock, RotatingLogFile, SystemClock};
use crate::session::types::{LogSessionConfig, SessionError};
use crate::session::writer::LogEncoder;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;

/// Commands sent from the pipeline to the log worker.
#[derive(Debug, Clone)]
pub enum LogCommand {
    /// Close any open file and start a new session
    Initialize(LogSessionConfig),
    /// Append a flushed batch
    Log(Batch),
    /// Close the current file; the next batch starts a new one
    Stop,
    /// Restart elapsed time at the next logged point
    Clear,
    Shutdown,
}

struct LogSession {
    encoder: LogEncoder,
    file: RotatingLogFile,
    /// Set after a reported failure, cleared by the next success
    failing: bool,
}

pub struct LogWorker {
    cmd_rx: Receiver<LogCommand>,
    msg_tx: Sender<SinkMessage>,
    session: Option<LogSession>,
    clock: fn() -> Box<dyn Clock>,
}

fn system_clock() -> Box<dyn Clock> {
    Box::new(SystemClock)
}

impl LogWorker {
    pub fn new(cmd_rx: Receiver<LogCommand>, msg_tx: Sender<SinkMessage>) -> Self {
        Self {
            cmd_rx,
            msg_tx,
            session: None,
            clock: system_clock,
        }
    }

    /// Use another clock for file names
    pub fn with_clock(mut self, clock: fn() -> Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run until `Shutdown` is received or the pipeline is gone.
    pub fn run(mut self) {
        tracing::info!("Log worker started");
        while let Ok(cmd) = self.cmd_rx.recv() {
            if !self.handle(cmd) {
                break;
            }
        }
        self.close();
        tracing::info!("Log worker exiting");
    }

    /// Process one command. Returns false on shutdown.
    pub fn handle(&mut self, cmd: LogCommand) -> bool {
        match cmd {
            LogCommand::Initialize(config) => self.initialize(config),
            LogCommand::Log(batch) => self.log(&batch),
            LogCommand::Stop => self.close(),
            LogCommand::Clear => {
                if let Some(session) = self.session.as_mut() {
                    session.encoder.reset_origin();
                }
            }
            LogCommand::Shutdown => return false,
        }
        true
    }

    fn initialize(&mut self, config: LogSessionConfig) {
        self.close();
        let encoder = LogEncoder::new(&config);
        let file = RotatingLogFile::new(
            config.directory.clone(),
            config.groupname.clone(),
            encoder.layout(),
            config.max_file_size,
            (self.clock)(),
        );
        tracing::debug!(
            directory = ?config.directory,
            format = %config.format,
            "Log session initialized"
        );

        let mut session = LogSession {
            encoder,
            file,
            failing: false,
        };
        if let Err(e) = session.file.ensure_directory() {
            session.failing = true;
            self.report(&e);
        }
        self.session = Some(session);
    }

    fn log(&mut self, batch: &Batch) {
        let Some(session) = self.session.as_mut() else {
            tracing::trace!("Batch received without a log session");
            return;
        };

        let checkpoint = session.encoder.checkpoint();
        let result = session.encoder.encode(batch).and_then(|records| {
            records
                .iter()
                .try_for_each(|record| session.file.write_record(record))
        });

        match result {
            Ok(()) => session.failing = false,
            Err(e) => {
                session.encoder.restore(checkpoint);
                let first_failure = !std::mem::replace(&mut session.failing, true);
                if first_failure {
                    self.report(&e);
                } else {
                    tracing::debug!("Log write failed again: {}", e);
                }
            }
        }
    }

    fn close(&mut self) {
        let result = match self.session.as_mut() {
            Some(session) => session.file.finish(),
            None => Ok(()),
        };
        if let Err(e) = result {
            self.report(&e);
        }
    }

    fn report(&self, err: &SessionError) {
        tracing::error!("{}", err);
        if self.msg_tx.send(SinkMessage::Error(err.report())).is_err() {
            tracing::debug!("Error report dropped, receiver gone");
        }
    }
}

/// The pipeline's end of the log worker
pub struct LogWorkerHandle {
    tx: Sender<LogCommand>,
    handle: Option<JoinHandle<()>>,
}

impl LogWorkerHandle {
    /// Spawn a log worker thread reporting errors on `msg_tx`
    pub fn spawn(msg_tx: Sender<SinkMessage>, capacity: usize) -> PipelineResult<Self> {
        let (tx, rx) = bounded(capacity);
        let worker = LogWorker::new(rx, msg_tx);
        let handle = std::thread::Builder::new()
            .name("varlog-logger".to_string())
            .spawn(move || worker.run())
            .map_err(|source| PipelineError::Spawn {
                name: "log worker",
                source,
            })?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// A handle without a thread; commands go to `tx`
    pub fn detached(tx: Sender<LogCommand>) -> Self {
        Self { tx, handle: None }
    }

    pub fn send(&self, cmd: LogCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::warn!("Log worker is gone, command dropped");
        }
    }

    /// Stop the worker and wait for it to finish its file
    pub fn shutdown(&mut self) {
        self.send(LogCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Log worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecimalStyle, LogFormat, LogMode};
    use crate::pipeline::packet::OutputBuffer;

    fn batch(y: f64) -> Batch {
        let mut buffer = OutputBuffer::new("motor", "speed");
        buffer.push(1000.0, y);
        Batch {
            buffers: vec![buffer],
            frames: Vec::new(),
        }
    }

    fn worker() -> (LogWorker, Receiver<SinkMessage>) {
        let (_cmd_tx, cmd_rx) = bounded(8);
        let (msg_tx, msg_rx) = bounded(8);
        (LogWorker::new(cmd_rx, msg_tx), msg_rx)
    }

    #[test]
    fn test_stop_then_log_opens_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut worker, _msg_rx) = worker();
        let config = LogSessionConfig::new(dir.path(), "motor")
            .with_format(LogMode::Full, LogFormat::Stcm)
            .with_decimal_style(DecimalStyle::Point);

        worker.handle(LogCommand::Initialize(config));
        worker.handle(LogCommand::Log(batch(1.0)));
        worker.handle(LogCommand::Stop);
        worker.handle(LogCommand::Log(batch(2.0)));
        assert!(!worker.handle(LogCommand::Shutdown));
        worker.close();

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2);
        for file in files {
            let content = std::fs::read_to_string(file).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
            assert_eq!(parsed.as_array().map(Vec::len), Some(1));
        }
    }

    #[test]
    fn test_directory_failure_reports_once() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let (mut worker, msg_rx) = worker();

        let config = LogSessionConfig::new(blocker.join("logs"), "motor");
        worker.handle(LogCommand::Initialize(config));
        worker.handle(LogCommand::Log(batch(1.0)));
        worker.handle(LogCommand::Log(batch(2.0)));

        let errors: Vec<_> = msg_rx.try_iter().collect();
        assert_eq!(errors.len(), 1);
        let SinkMessage::Error(report) = &errors[0] else {
            panic!("expected an error report");
        };
        assert_eq!(report.title, "Cannot create log directory");
    }

    #[test]
    fn test_failed_batch_is_logged_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let logs = blocker.join("logs");
        let (mut worker, _msg_rx) = worker();

        let config = LogSessionConfig::new(logs.clone(), "motor")
            .with_format(LogMode::Changes, LogFormat::Stcm)
            .with_decimal_style(DecimalStyle::Point);
        worker.handle(LogCommand::Initialize(config));
        worker.handle(LogCommand::Log(batch(1.0)));

        std::fs::remove_file(&blocker).unwrap();
        worker.handle(LogCommand::Log(batch(1.0)));
        worker.handle(LogCommand::Stop);

        let files: Vec<_> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(&files[0]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed[0]["variabledata"][0]["y"], 1.0);
    }

    #[test]
    fn test_log_without_session_is_ignored() {
        let (mut worker, msg_rx) = worker();
        assert!(worker.handle(LogCommand::Log(batch(1.0))));
        assert!(msg_rx.try_recv().is_err());
    }
}
