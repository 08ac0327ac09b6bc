//! Sample stream interfaces.
//!
//! The modem core never touches files or audio hardware directly. The
//! demodulator pulls mono samples from a [`SampleSource`] and the modulator
//! pushes them into a [`SampleSink`]; the frontend supplies WAV- and
//! device-backed implementations. [`MemorySource`] and [`MemorySink`] back
//! the tests and make loopback runs possible without any I/O.

/// Pull-model source of mono samples at a fixed sample rate.
pub trait SampleSource {
    /// Fill `out` with up to `out.len()` samples and return how many were
    /// produced. A short count means the stream has ended; live sources
    /// block until the full count is available instead.
    fn read(&mut self, out: &mut [f64]) -> Result<usize, String>;

    /// True for live capture devices, which never report end-of-stream and
    /// are subject to the no-signal timeout.
    fn is_live(&self) -> bool {
        false
    }
}

/// Push-model sink for mono samples in [-1, 1].
pub trait SampleSink {
    /// Accept a block of samples, blocking if the underlying device needs
    /// to drain first.
    fn write(&mut self, samples: &[f64]) -> Result<(), String>;

    /// Flush anything buffered and wait for the device to finish playing.
    fn finish(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// In-memory sample source over a prerecorded buffer.
pub struct MemorySource {
    samples: Vec<f64>,
    pos: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<f64>) -> Self {
        MemorySource { samples, pos: 0 }
    }
}

impl SampleSource for MemorySource {
    fn read(&mut self, out: &mut [f64]) -> Result<usize, String> {
        let n = out.len().min(self.samples.len() - self.pos);
        out[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// In-memory sample sink collecting everything written to it.
pub struct MemorySink {
    samples: Vec<f64>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink { samples: Vec::new() }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSink for MemorySink {
    fn write(&mut self, samples: &[f64]) -> Result<(), String> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }
}
