//! In-memory recorder.
//!
//! Emits one small chunk per frame and logs every frame's absolute time,
//! so exports can be inspected without an external encoder.

use std::sync::{Arc, Mutex};

use dashview_common::error::{DashviewError, DashviewResult};
use dashview_event_model::ExportFormat;

use crate::canvas::RasterFrame;
use crate::encoder::{Recorder, RecorderFactory, RecorderSpec};

/// Frames seen by memory recorders created from one factory.
#[derive(Debug, Clone, Default)]
pub struct FrameLog {
    inner: Arc<Mutex<FrameLogInner>>,
}

#[derive(Debug, Default)]
struct FrameLogInner {
    times: Vec<f64>,
    specs: Vec<RecorderSpec>,
    aborted: usize,
    finished: usize,
}

impl FrameLog {
    /// Absolute times of every frame pushed, in order.
    pub fn times(&self) -> Vec<f64> {
        self.inner.lock().map(|l| l.times.clone()).unwrap_or_default()
    }

    pub fn specs(&self) -> Vec<RecorderSpec> {
        self.inner.lock().map(|l| l.specs.clone()).unwrap_or_default()
    }

    pub fn aborted(&self) -> usize {
        self.inner.lock().map(|l| l.aborted).unwrap_or_default()
    }

    pub fn finished(&self) -> usize {
        self.inner.lock().map(|l| l.finished).unwrap_or_default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FrameLogInner) -> R) -> Option<R> {
        self.inner.lock().ok().map(|mut inner| f(&mut inner))
    }
}

#[derive(Debug)]
pub struct MemoryRecorder {
    log: FrameLog,
    spec: Option<RecorderSpec>,
    pending: Vec<Vec<u8>>,
    frames: u64,
    fail_on_frame: Option<u64>,
}

impl MemoryRecorder {
    pub fn new(log: FrameLog) -> Self {
        Self {
            log,
            spec: None,
            pending: Vec::new(),
            frames: 0,
            fail_on_frame: None,
        }
    }

    /// Fail the `n`th pushed frame (zero-based).
    pub fn failing_at(mut self, n: u64) -> Self {
        self.fail_on_frame = Some(n);
        self
    }
}

impl Recorder for MemoryRecorder {
    fn start(&mut self, spec: &RecorderSpec) -> DashviewResult<()> {
        if self.spec.is_some() {
            return Err(DashviewError::encoder("recorder already started"));
        }
        self.log.with(|l| l.specs.push(spec.clone()));
        self.spec = Some(spec.clone());
        Ok(())
    }

    fn push_frame(&mut self, frame: &RasterFrame) -> DashviewResult<()> {
        let Some(spec) = &self.spec else {
            return Err(DashviewError::encoder("frame pushed before recorder start"));
        };
        if frame.width != spec.width || frame.height != spec.height {
            return Err(DashviewError::encoder(format!(
                "frame is {}x{}, recorder expects {}x{}",
                frame.width, frame.height, spec.width, spec.height
            )));
        }
        if self.fail_on_frame == Some(self.frames) {
            return Err(DashviewError::encoder(format!("injected failure at frame {}", self.frames)));
        }
        self.log.with(|l| l.times.push(frame.absolute_secs));
        self.pending.push(frame.absolute_secs.to_le_bytes().to_vec());
        self.frames += 1;
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pending)
    }

    fn finish(&mut self) -> DashviewResult<Vec<Vec<u8>>> {
        if self.spec.is_none() {
            return Err(DashviewError::encoder("recorder finished before start"));
        }
        self.log.with(|l| l.finished += 1);
        Ok(self.take_chunks())
    }

    fn abort(&mut self) {
        self.pending.clear();
        self.log.with(|l| l.aborted += 1);
    }

    fn frames_pushed(&self) -> u64 {
        self.frames
    }
}

/// Factory for [`MemoryRecorder`]s sharing one [`FrameLog`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorderFactory {
    log: FrameLog,
    fail_on_frame: Option<u64>,
}

impl MemoryRecorderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, n: u64) -> Self {
        self.fail_on_frame = Some(n);
        self
    }

    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }
}

impl RecorderFactory for MemoryRecorderFactory {
    fn create(&self, _format: ExportFormat) -> DashviewResult<Box<dyn Recorder>> {
        let recorder = MemoryRecorder::new(self.log.clone());
        Ok(Box::new(match self.fail_on_frame {
            Some(n) => recorder.failing_at(n),
            None => recorder,
        }))
    }
}
