//! End-of-transmission detection.
//!
//! The TI-99/4A drives a real cassette deck through its remote-control
//! relay and simply stops the motor when it is done; nothing in the signal
//! itself marks the end. The detector instead averages the combined power
//! of the two symbol bins over a two-symbol window, captures that average
//! as a reference once the stream has framed, and declares the
//! transmission over when the power later falls a fixed ratio below it.
//!
//! Squared magnitudes are used throughout so no square root runs per
//! sample; the ratio is squared to compare like quantities. Two symbols of
//! history is a deliberate middle ground: a shorter window trips over the
//! gaps between symbols, a longer one eats the end of the recording.

use crate::spectrum::Bins;
use crate::{Geometry, POWER_WINDOW_SYMBOLS, SIGNAL_POWER_RANGE};

/// Average-power watchdog armed by framing.
pub struct EotDetector {
    /// Squared bin-1 + bin-2 power for the last two symbols.
    power: Vec<f64>,
    pos: usize,
    /// Average squared power captured after framing; 0 means not yet set.
    ref_power_sq: f64,
}

impl EotDetector {
    pub fn new(geom: &Geometry) -> Self {
        EotDetector {
            power: vec![0.0; POWER_WINDOW_SYMBOLS * geom.symbol_len],
            pos: 0,
            ref_power_sq: 0.0,
        }
    }

    /// Record one probe's power. Returns true when a framed signal has
    /// dropped far enough below its reference strength to call the
    /// transmission complete.
    pub fn step(&mut self, bins: &Bins, framed: bool) -> bool {
        self.power[self.pos] = bins[1].norm_sqr() + bins[2].norm_sqr();
        self.pos += 1;
        if self.pos >= self.power.len() {
            let mean = self.power.iter().sum::<f64>() / self.power.len() as f64;
            if framed {
                if self.ref_power_sq == 0.0 {
                    self.ref_power_sq = mean;
                } else if mean * SIGNAL_POWER_RANGE * SIGNAL_POWER_RANGE < self.ref_power_sq {
                    return true;
                }
            }
            self.pos = 0;
        }
        false
    }

    #[cfg(test)]
    fn ref_power_sq(&self) -> f64 {
        self.ref_power_sq
    }
}
