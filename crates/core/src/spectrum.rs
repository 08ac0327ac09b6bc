//! Windowed spectral probe.
//!
//! One probe covers exactly one wavelength of the base frequency, so the
//! DFT bins land precisely on the frequencies of interest: bin 0 is the DC
//! offset, bin 1 the "0" symbol frequency, bin 2 the "1" symbol frequency.
//!
//! A window segment cut from a random position in the stream has sharp
//! edges that smear energy across bins, which would make alternating bit
//! patterns indistinguishable. A raised half-sine window masks the edges
//! off before the transform. The table is computed in f64: the product runs
//! once per sample over arbitrarily long recordings, and single precision
//! drifts enough to bias the discriminant.

use std::f64::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::Geometry;

/// The three spectral bins the modem cares about: DC, f₀, 2·f₀.
pub type Bins = [Complex<f64>; 3];

/// Windowed one-wavelength DFT returning the first three bins.
pub struct SpectralProbe {
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
}

impl SpectralProbe {
    pub fn new(geom: &Geometry) -> Self {
        let len = geom.wavelength;
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(len);
        let spectrum = fft.make_output_vec();
        // Half a sine wave, zero at both edges, peaking mid-window.
        let window = (0..len)
            .map(|c| (c as f64 / (len - 1) as f64 * PI - PI / 2.0).cos())
            .collect();
        SpectralProbe { fft, window, spectrum }
    }

    /// Window `samples` in place and transform them. The buffer is scratch
    /// space for the transform and holds garbage afterwards.
    pub fn probe(&mut self, samples: &mut [f64]) -> Result<Bins, String> {
        for (s, w) in samples.iter_mut().zip(&self.window) {
            *s *= w;
        }
        self.fft
            .process(samples, &mut self.spectrum)
            .map_err(|e| format!("forward DFT failed: {}", e))?;
        Ok([self.spectrum[0], self.spectrum[1], self.spectrum[2]])
    }

    #[cfg(test)]
    fn window(&self) -> &[f64] {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_SAMPLE_RATE, ZERO_FREQ};

    fn probe_of(samples: &[f64]) -> Bins {
        let geom = Geometry::new(DEFAULT_SAMPLE_RATE, ZERO_FREQ).unwrap();
        let mut probe = SpectralProbe::new(&geom);
        let mut buf = samples.to_vec();
        probe.probe(&mut buf).unwrap()
    }

    #[test]
    fn test_window_shape() {
        let geom = Geometry::new(DEFAULT_SAMPLE_RATE, ZERO_FREQ).unwrap();
        let probe = SpectralProbe::new(&geom);
        let w = probe.window();
        assert_eq!(w.len(), 32);
        // Edges fade to zero, the middle passes the signal through.
        assert!(w[0].abs() < 1e-12);
        assert!(w[31].abs() < 1e-12);
        assert!(w[15] > 0.99 && w[15] <= 1.0);
        // Symmetric up to the off-center peak of an even-length table.
        for c in 0..16 {
            assert!((w[c] - w[31 - c]).abs() < 1e-12);
        }
    }

    // The half-sine window trades some leakage into the neighboring bin
    // for clean edges, so a pure tone dominates by roughly 3x rather than
    // by orders of magnitude. The discriminator only needs the sign of the
    // difference.

    #[test]
    fn test_zero_tone_concentrates_in_bin_one() {
        let wave: Vec<f64> = (0..32)
            .map(|c| (2.0 * PI * c as f64 / 32.0).sin())
            .collect();
        let bins = probe_of(&wave);
        assert!(bins[1].norm() > 2.0 * bins[2].norm());
    }

    #[test]
    fn test_one_tone_concentrates_in_bin_two() {
        let wave: Vec<f64> = (0..32)
            .map(|c| (4.0 * PI * c as f64 / 32.0).sin())
            .collect();
        let bins = probe_of(&wave);
        assert!(bins[2].norm() > 2.0 * bins[1].norm());
    }

    #[test]
    fn test_dc_lands_in_bin_zero() {
        let bins = probe_of(&[0.5; 32]);
        assert!(bins[0].norm() > 2.0 * bins[1].norm());
        assert!(bins[0].norm() > 2.0 * bins[2].norm());
    }
}
