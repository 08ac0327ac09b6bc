//! Sliding window over a sample source.
//!
//! The demodulator runs one DFT per input sample, so it needs a cheap way
//! to read a full wavelength starting at every successive offset. The
//! [`SlidingBuffer`] keeps a fixed block of recent samples and refills it
//! half at a time: while one half is being analyzed the other is
//! overwritten with fresh samples, so a requested window may straddle the
//! split and is reassembled contiguously into the caller's buffer.
//!
//! Past end-of-stream the tail of a request is zero-filled and only the
//! count of real samples is reported; a zero count tells the caller the
//! recording is over.

use crate::io::SampleSource;

/// Double-buffered ring over a [`SampleSource`] with absolute offsets.
pub struct SlidingBuffer {
    buf: Vec<f64>,
    /// Absolute offset of the first stored sample.
    base_offset: usize,
    /// Valid samples stored starting at `base_offset`.
    fill: usize,
    /// Which half gets overwritten by the next refill (0 or 1).
    section: usize,
    eof: bool,
    primed: bool,
}

impl SlidingBuffer {
    /// Create a buffer holding `capacity` samples. `capacity` must be even.
    pub fn new(capacity: usize) -> Self {
        SlidingBuffer {
            buf: vec![0.0; capacity],
            base_offset: 0,
            fill: 0,
            section: 0,
            eof: false,
            primed: false,
        }
    }

    /// Copy `out.len()` samples starting at absolute `offset` into `out`,
    /// advancing `source` as needed. Returns the number of real samples
    /// copied; the remainder of `out` is zero-filled once the source is
    /// exhausted.
    ///
    /// Requests must not reach backwards past the start of the buffer and
    /// must not exceed its capacity; both are programming errors.
    pub fn read_at(
        &mut self,
        source: &mut dyn SampleSource,
        offset: usize,
        out: &mut [f64],
    ) -> Result<usize, String> {
        let capacity = self.buf.len();
        let half = capacity / 2;
        let length = out.len();
        if length > capacity {
            return Err(format!(
                "window of {} samples exceeds the {}-sample audio buffer",
                length, capacity
            ));
        }
        if offset < self.base_offset {
            return Err(format!(
                "backward read at offset {} (buffer starts at {})",
                offset, self.base_offset
            ));
        }

        if !self.primed {
            self.fill = source.read(&mut self.buf)?;
            if self.fill < capacity {
                self.eof = true;
            }
            self.primed = true;
        }

        // Refill half at a time until the window fits or the source ends.
        while !self.eof && self.base_offset + self.fill < offset + length {
            let start = if self.section == 1 { half } else { 0 };
            let count = source.read(&mut self.buf[start..start + half])?;
            self.base_offset += half;
            self.section = 1 - self.section;
            if count < half {
                self.eof = true;
                self.fill -= half - count;
            }
        }

        let valid = (self.base_offset + self.fill)
            .saturating_sub(offset)
            .min(length);
        let i = offset - self.base_offset;

        if self.section == 0 {
            // Storage is contiguous: logical position == physical position.
            out[..valid].copy_from_slice(&self.buf[i..i + valid]);
        } else if i < half {
            // Window starts in the older half, stored physically second.
            if i + valid > half {
                let first = half - i;
                out[..first].copy_from_slice(&self.buf[half + i..]);
                out[first..valid].copy_from_slice(&self.buf[..valid - first]);
            } else {
                out[..valid].copy_from_slice(&self.buf[half + i..half + i + valid]);
            }
        } else {
            // Window starts in the newer half, stored physically first.
            out[..valid].copy_from_slice(&self.buf[i - half..i - half + valid]);
        }

        for s in out[valid..].iter_mut() {
            *s = 0.0;
        }
        Ok(valid)
    }
}
