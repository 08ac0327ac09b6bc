//! FSK modulator.
//!
//! Two wave tables are synthesized up front by inverse DFT: one full cycle
//! of the base frequency for "0" and two cycles of the doubled frequency
//! for "1", both one wavelength long. Setting a single harmonic's imaginary
//! component selects a pure sine of that frequency; the −0.5 magnitude
//! comes out of the transform as a unit-amplitude wave once the conjugate
//! half of the spectrum is folded in. After that, playback is pure table
//! slicing with no per-sample trigonometry.
//!
//! A "1" is a whole cycle of the high frequency, so it enters and leaves a
//! symbol with the same polarity. A "0" is half a cycle of the base
//! frequency and flips polarity. Tracking that flip and starting each
//! symbol slice on the matching half of its table keeps the composite
//! waveform phase-continuous across every bit boundary.

use std::io::Read;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner};

use crate::io::SampleSink;
use crate::{Geometry, PREAMBLE_SECS};

/// Byte-stream to FSK audio converter.
pub struct Modulator {
    /// One cycle of the base frequency, length W.
    zero_wave: Vec<f64>,
    /// Two cycles of the doubled frequency, length W.
    one_wave: Vec<f64>,
    wavelength: usize,
    symbol_len: usize,
    sample_rate: u32,
    /// Polarity of the next half-wave.
    positive: bool,
}

impl Modulator {
    /// Build the wave tables for the given geometry.
    pub fn new(geom: &Geometry) -> Result<Modulator, String> {
        let len = geom.wavelength;
        let mut planner = RealFftPlanner::<f64>::new();
        let ifft = planner.plan_fft_inverse(len);

        let mut harmonics = ifft.make_input_vec();
        let mut zero_wave = ifft.make_output_vec();
        harmonics[1] = Complex::new(0.0, -0.5);
        ifft.process(&mut harmonics, &mut zero_wave)
            .map_err(|e| format!("synthesizing zero wave: {}", e))?;

        for h in harmonics.iter_mut() {
            *h = Complex::new(0.0, 0.0);
        }
        harmonics[2] = Complex::new(0.0, -0.5);
        let mut one_wave = ifft.make_output_vec();
        ifft.process(&mut harmonics, &mut one_wave)
            .map_err(|e| format!("synthesizing one wave: {}", e))?;

        Ok(Modulator {
            zero_wave,
            one_wave,
            wavelength: geom.wavelength,
            symbol_len: geom.symbol_len,
            sample_rate: geom.sample_rate,
            positive: true,
        })
    }

    /// Modulate an entire byte stream: preamble, payload, trailer, drain.
    pub fn play(&mut self, input: &mut dyn Read, sink: &mut dyn SampleSink) -> Result<(), String> {
        self.write_preamble(sink)?;

        let mut buf = [0u8; 4096];
        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(format!("reading data input: {}", e)),
            };
            for &byte in &buf[..n] {
                self.write_byte(byte, sink)?;
            }
        }

        // An extra half-wave of "0" so the final symbol has a clean edge.
        let m = self.symbol_len;
        let pad = if self.positive {
            &self.zero_wave[..m]
        } else {
            &self.zero_wave[m..]
        };
        sink.write(pad)?;
        sink.finish()
    }

    /// Five seconds of zeros, then a byte of ones to complete the header.
    pub fn write_preamble(&mut self, sink: &mut dyn SampleSink) -> Result<(), String> {
        let cycles = self.sample_rate as usize * PREAMBLE_SECS / self.wavelength;
        for _ in 0..cycles {
            sink.write(&self.zero_wave)?;
        }
        for _ in 0..8 {
            sink.write(&self.one_wave[..self.symbol_len])?;
        }
        self.positive = true;
        Ok(())
    }

    /// Emit one byte as eight symbol slices, MSB first.
    pub fn write_byte(&mut self, byte: u8, sink: &mut dyn SampleSink) -> Result<(), String> {
        for n in (0..8).rev() {
            if byte & (1 << n) != 0 {
                self.write_one(sink)?;
            } else {
                self.write_zero(sink)?;
            }
        }
        Ok(())
    }

    /// A "1": one full cycle of the doubled frequency. An even number of
    /// half-cycles, so the polarity is left alone.
    fn write_one(&mut self, sink: &mut dyn SampleSink) -> Result<(), String> {
        let w = self.wavelength;
        let m = self.symbol_len;
        let slice = if self.positive {
            &self.one_wave[..m]
        } else {
            &self.one_wave[w / 4..w / 4 + (w - m)]
        };
        sink.write(slice)
    }

    /// A "0": half a cycle of the base frequency, flipping the polarity.
    fn write_zero(&mut self, sink: &mut dyn SampleSink) -> Result<(), String> {
        let m = self.symbol_len;
        let slice = if self.positive {
            &self.zero_wave[..m]
        } else {
            &self.zero_wave[m..]
        };
        self.positive = !self.positive;
        sink.write(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySink;
    use crate::{DEFAULT_SAMPLE_RATE, ZERO_FREQ};

    fn modulator() -> Modulator {
        let geom = Geometry::new(DEFAULT_SAMPLE_RATE, ZERO_FREQ).unwrap();
        Modulator::new(&geom).unwrap()
    }

    #[test]
    fn test_wave_tables() {
        let m = modulator();
        assert_eq!(m.zero_wave.len(), 32);
        assert_eq!(m.one_wave.len(), 32);
        // Unit amplitude: a single ±0.5i harmonic doubles through the
        // conjugate fold of the inverse real transform.
        let peak = m.zero_wave.iter().fold(0.0f64, |a, &s| a.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-9, "zero wave peak was {}", peak);
        // The one wave is the zero wave played at double speed.
        for c in 0..32 {
            assert!((m.one_wave[c] - m.zero_wave[(2 * c) % 32]).abs() < 1e-9);
        }
        // Half-wave antisymmetry: the second half mirrors the first.
        for c in 0..16 {
            assert!((m.zero_wave[c] + m.zero_wave[c + 16]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_samples_stay_in_range() {
        let mut m = modulator();
        let mut sink = MemorySink::new();
        let data = [0xA5u8, 0x00, 0xFF, 0x5A];
        m.play(&mut &data[..], &mut sink).unwrap();
        for &s in sink.samples() {
            assert!(s.abs() <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn test_modulated_length() {
        let mut m = modulator();
        let mut sink = MemorySink::new();
        let data = [0x00u8];
        m.play(&mut &data[..], &mut sink).unwrap();
        let preamble = (DEFAULT_SAMPLE_RATE as usize * PREAMBLE_SECS / 32) * 32 + 8 * 16;
        // Payload is eight symbols, trailer one more half-wave.
        assert_eq!(sink.samples().len(), preamble + 8 * 16 + 16);
    }

    #[test]
    fn test_bit_order_msb_first() {
        let mut m = modulator();
        m.positive = true;

        // 0x80: the first emitted symbol is a "1" slice.
        let mut sink = MemorySink::new();
        m.write_byte(0x80, &mut sink).unwrap();
        let samples = sink.into_samples();
        assert_eq!(samples.len(), 8 * 16);
        assert_eq!(&samples[..16], &m.one_wave[..16]);
        // The remaining seven symbols are alternating zero half-waves.
        assert_eq!(&samples[16..32], &m.zero_wave[..16]);
        assert_eq!(&samples[32..48], &m.zero_wave[16..]);

        // 0x01: seven zeros first, the "1" slice last.
        m.positive = true;
        let mut sink = MemorySink::new();
        m.write_byte(0x01, &mut sink).unwrap();
        let samples = sink.into_samples();
        assert_eq!(&samples[..16], &m.zero_wave[..16]);
        // Seven zeros flip polarity each time, so the final "1" starts on
        // the negative half.
        assert_eq!(&samples[7 * 16..], &m.one_wave[8..24]);
    }

    #[test]
    fn test_zero_run_alternates_polarity() {
        let mut m = modulator();
        m.positive = true;
        let mut sink = MemorySink::new();
        m.write_byte(0x00, &mut sink).unwrap();
        let samples = sink.into_samples();
        for symbol in 0..8 {
            let slice = &samples[symbol * 16..(symbol + 1) * 16];
            let expected = if symbol % 2 == 0 {
                &m.zero_wave[..16]
            } else {
                &m.zero_wave[16..]
            };
            assert_eq!(slice, expected);
        }
    }
}
