//! Symbol discriminator.
//!
//! Fed one spectral probe per input sample, the discriminator tracks the
//! difference between the "0" and "1" bin magnitudes over the last half
//! symbol and emits a bit whenever the smoothed difference changes sign. A
//! half-symbol history is long enough to ride out noise but short enough
//! that symbol boundaries stay sharp; a full symbol of history would blur
//! them away.
//!
//! Sign changes only mark transitions, so runs of identical bits are
//! carried by a timeout: once a symbol has lasted half again its nominal
//! length, the current bit is emitted again and one symbol length is
//! subtracted from the counter, keeping the bit clock phase instead of
//! restarting it.

use crate::spectrum::Bins;
use crate::Geometry;

/// Per-sample bit decision state.
pub struct Discriminator {
    /// Recent `|bin1| - |bin2|` values, half a symbol long.
    diffs: Vec<f64>,
    pos: usize,
    /// The bit the signal is currently sitting on.
    current_symbol: u8,
    /// Samples seen since the last emission.
    samples_in_symbol: usize,
    symbol_len: usize,
    timeout: usize,
}

impl Discriminator {
    /// Starts on symbol 1 so the first preamble zero registers as a
    /// transition and is emitted rather than swallowed.
    pub fn new(geom: &Geometry) -> Self {
        Discriminator {
            diffs: vec![0.0; (geom.symbol_len / 2).max(1)],
            pos: 0,
            current_symbol: 1,
            samples_in_symbol: 0,
            symbol_len: geom.symbol_len,
            timeout: geom.symbol_timeout(),
        }
    }

    /// Consume one probe; returns a decoded bit when one is due.
    pub fn step(&mut self, bins: &Bins) -> Option<u8> {
        self.diffs[self.pos] = bins[1].norm() - bins[2].norm();
        self.pos += 1;
        if self.pos >= self.diffs.len() {
            self.pos = 0;
        }
        self.samples_in_symbol += 1;

        let avg: f64 = self.diffs.iter().sum::<f64>() / self.diffs.len() as f64;

        if self.current_symbol == 1 && avg > 0.0 {
            self.current_symbol = 0;
            self.samples_in_symbol = 0;
            Some(0)
        } else if self.current_symbol == 0 && avg < 0.0 {
            self.current_symbol = 1;
            self.samples_in_symbol = 0;
            Some(1)
        } else if self.samples_in_symbol > self.timeout {
            self.samples_in_symbol -= self.symbol_len;
            Some(self.current_symbol)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn samples_in_symbol(&self) -> usize {
        self.samples_in_symbol
    }
}
