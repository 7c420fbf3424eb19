//! Tick-based batching of output points.
//!
//! Points are appended as samples arrive and flushed as one [`Batch`] per
//! tick. The emitter goes idle on the first tick that finds nothing to send,
//! and is restarted by the next accepted sample.

use crate::pipeline::packet::{Batch, Frame, OutputBuffer};

/// Result of a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing accumulated; the timer should stop
    Idle,
    Flush(Batch),
}

#[derive(Debug, Clone)]
pub struct BatchEmitter {
    buffers: Vec<OutputBuffer>,
    frames: Vec<Frame>,
    track_frames: bool,
    running: bool,
}

impl BatchEmitter {
    /// One buffer per output name, in order.
    ///
    /// `track_frames` keeps full variable rows for column-oriented logging.
    pub fn new<I, S>(groupname: &str, outputs: I, track_frames: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buffers: outputs
                .into_iter()
                .map(|name| OutputBuffer::new(groupname, name))
                .collect(),
            frames: Vec::new(),
            track_frames,
            running: false,
        }
    }

    pub fn buffers(&self) -> &[OutputBuffer] {
        &self.buffers
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Mark the timer as running. Returns true when it was idle.
    pub fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.running, true)
    }

    /// Stop the timer without flushing
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Append a point to output `index`
    #[inline]
    pub fn push(&mut self, index: usize, x: f64, y: f64) {
        if let Some(buffer) = self.buffers.get_mut(index) {
            buffer.push(x, y);
        }
    }

    pub fn push_frame(&mut self, frame: Frame) {
        if self.track_frames {
            self.frames.push(frame);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.buffers.iter().all(OutputBuffer::is_empty)
    }

    /// Drop everything accumulated
    pub fn clear(&mut self) {
        self.frames.clear();
        for buffer in &mut self.buffers {
            buffer.points.clear();
        }
    }

    /// Flush accumulated points, or go idle when there are none
    pub fn on_tick(&mut self) -> TickOutcome {
        if self.is_empty() {
            self.running = false;
            return TickOutcome::Idle;
        }

        let buffers = self
            .buffers
            .iter_mut()
            .filter(|b| !b.is_empty())
            .map(OutputBuffer::take)
            .collect();
        let frames = std::mem::take(&mut self.frames);
        TickOutcome::Flush(Batch { buffers, frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter() -> BatchEmitter {
        BatchEmitter::new("g", ["a", "b", "c"], true)
    }

    #[test]
    fn test_idle_tick_stops() {
        let mut emitter = emitter();
        assert!(emitter.start());
        assert!(!emitter.start());
        assert_eq!(emitter.on_tick(), TickOutcome::Idle);
        assert!(!emitter.is_running());
    }

    #[test]
    fn test_flush_sends_only_non_empty_buffers() {
        let mut emitter = emitter();
        emitter.start();
        emitter.push(0, 1.0, 10.0);
        emitter.push(2, 1.0, 30.0);
        emitter.push(0, 2.0, 11.0);

        let TickOutcome::Flush(batch) = emitter.on_tick() else {
            panic!("expected a flush");
        };
        let names: Vec<_> = batch.buffers.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(batch.buffers[0].len(), 2);
        assert!(emitter.is_empty());
        assert!(emitter.is_running());

        assert_eq!(emitter.on_tick(), TickOutcome::Idle);
    }

    #[test]
    fn test_frames_only_when_tracked() {
        let mut tracked = emitter();
        tracked.push_frame(Frame {
            x: 0.0,
            values: vec![Some(1.0)],
        });
        assert!(!tracked.is_empty());

        let mut untracked = BatchEmitter::new("g", ["a"], false);
        untracked.push_frame(Frame {
            x: 0.0,
            values: vec![Some(1.0)],
        });
        assert!(untracked.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut emitter = emitter();
        emitter.push(1, 0.0, 1.0);
        emitter.clear();
        assert!(emitter.is_empty());
    }
}
