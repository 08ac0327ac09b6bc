//! Record session driver.
//!
//! One [`Demodulator`] owns the whole receive pipeline: the sliding buffer
//! over the sample source, the windowed spectral probe, the symbol
//! discriminator, the end-of-transmission detector, and the deframer. The
//! loop advances the analysis window one sample at a time. A DFT per
//! sample is overkill, but it is far faster than realtime and the heavy
//! overlap averages noise out for free.

use std::io::Write;

use crate::audio_buffer::SlidingBuffer;
use crate::discriminator::Discriminator;
use crate::eot::EotDetector;
use crate::framer::{DeframeEvent, Deframer};
use crate::io::SampleSource;
use crate::spectrum::SpectralProbe;
use crate::{Geometry, AUDIO_BUFFER_SIZE, MAX_WAIT_SECS};

/// How a record session ended. All three are clean exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The framed signal's power dropped below the reference range.
    TransmissionEnded,
    /// The sample source ran out of samples.
    EndOfInput,
    /// A live source produced no preamble within the waiting period.
    NoSignal,
}

/// A single audio-to-bytes session.
pub struct Demodulator {
    geom: Geometry,
    buffer: SlidingBuffer,
    probe: SpectralProbe,
    discriminator: Discriminator,
    eot: EotDetector,
    deframer: Deframer,
    /// One wavelength of scratch, rewritten every sample.
    scratch: Vec<f64>,
}

impl Demodulator {
    pub fn new(geom: &Geometry) -> Demodulator {
        Demodulator {
            geom: *geom,
            buffer: SlidingBuffer::new(AUDIO_BUFFER_SIZE),
            probe: SpectralProbe::new(geom),
            discriminator: Discriminator::new(geom),
            eot: EotDetector::new(geom),
            deframer: Deframer::new(),
            scratch: vec![0.0; geom.wavelength],
        }
    }

    /// Decode `source` into `data_out` until the transmission ends, the
    /// source does, or a live source stays quiet too long. `on_signal` is
    /// called once when the preamble is found.
    pub fn run(
        &mut self,
        source: &mut dyn SampleSource,
        data_out: &mut dyn Write,
        on_signal: &mut dyn FnMut(),
    ) -> Result<RecordOutcome, String> {
        let max_quiet = MAX_WAIT_SECS as usize * self.geom.sample_rate as usize;
        let mut offset = 0usize;

        let outcome = loop {
            let valid = self.buffer.read_at(source, offset, &mut self.scratch)?;
            if valid == 0 {
                break RecordOutcome::EndOfInput;
            }

            let bins = self.probe.probe(&mut self.scratch)?;

            // Power bookkeeping runs first; a detected end suppresses any
            // bit decision for this sample.
            if self.eot.step(&bins, self.deframer.framed()) {
                break RecordOutcome::TransmissionEnded;
            }

            if let Some(bit) = self.discriminator.step(&bins) {
                match self.deframer.push(bit) {
                    Some(DeframeEvent::SignalAcquired) => on_signal(),
                    Some(DeframeEvent::Byte(byte)) => data_out
                        .write_all(&[byte])
                        .map_err(|e| format!("writing decoded byte: {}", e))?,
                    None => {}
                }
            }

            if source.is_live() && !self.deframer.framed() && offset >= max_quiet {
                break RecordOutcome::NoSignal;
            }
            offset += 1;
        };

        data_out
            .flush()
            .map_err(|e| format!("flushing decoded output: {}", e))?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemorySink, MemorySource};
    use crate::modulator::Modulator;
    use crate::{DEFAULT_SAMPLE_RATE, ZERO_FREQ};

    fn geom() -> Geometry {
        Geometry::new(DEFAULT_SAMPLE_RATE, ZERO_FREQ).unwrap()
    }

    fn modulate(payload: &[u8]) -> Vec<f64> {
        let mut modulator = Modulator::new(&geom()).unwrap();
        let mut sink = MemorySink::new();
        modulator.play(&mut &payload[..], &mut sink).unwrap();
        sink.into_samples()
    }

    fn demodulate(samples: Vec<f64>) -> (Vec<u8>, RecordOutcome) {
        let mut demod = Demodulator::new(&geom());
        let mut source = MemorySource::new(samples);
        let mut bytes = Vec::new();
        let outcome = demod
            .run(&mut source, &mut bytes, &mut || {})
            .unwrap();
        (bytes, outcome)
    }

    #[test]
    fn test_round_trip_single_zero_byte() {
        let (bytes, _) = demodulate(modulate(&[0x00]));
        assert_eq!(bytes, vec![0x00]);
    }

    #[test]
    fn test_round_trip_alternating_extremes() {
        let payload = [0xFF, 0x00, 0xFF];
        let (bytes, _) = demodulate(modulate(&payload));
        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_round_trip_walking_bit() {
        let payload = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80];
        let (bytes, _) = demodulate(modulate(&payload));
        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_round_trip_random_block() {
        let mut state = 0x2545F4914F6CDD1Du64;
        let payload: Vec<u8> = (0..64)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 56) as u8
            })
            .collect();
        let (bytes, _) = demodulate(modulate(&payload));
        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_round_trip_survives_noise() {
        // Approximately Gaussian noise, sigma 0.05, from a seeded
        // generator: sum of twelve uniforms has unit variance.
        let mut state = 0x9E3779B97F4A7C15u64;
        let mut uniform = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        let payload = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80];
        let mut samples = modulate(&payload);
        for s in samples.iter_mut() {
            let gauss: f64 = (0..12).map(|_| uniform()).sum::<f64>() - 6.0;
            *s += 0.05 * gauss;
        }
        let (bytes, _) = demodulate(samples);
        assert_eq!(bytes, payload);
    }

    #[test]
    fn test_signal_acquired_fires_once() {
        let mut demod = Demodulator::new(&geom());
        let mut source = MemorySource::new(modulate(&[0x55, 0xAA]));
        let mut bytes = Vec::new();
        let mut acquisitions = 0;
        demod
            .run(&mut source, &mut bytes, &mut || acquisitions += 1)
            .unwrap();
        assert_eq!(acquisitions, 1);
        assert_eq!(bytes, vec![0x55, 0xAA]);
    }

    #[test]
    fn test_trailing_silence_ends_transmission() {
        let mut samples = modulate(&[0x55]);
        samples.extend(std::iter::repeat(0.0).take(DEFAULT_SAMPLE_RATE as usize));
        let (bytes, outcome) = demodulate(samples);
        assert_eq!(bytes, vec![0x55]);
        assert_eq!(outcome, RecordOutcome::TransmissionEnded);
    }

    #[test]
    fn test_end_of_input_without_silence() {
        let (_, outcome) = demodulate(modulate(&[0xC3]));
        assert_eq!(outcome, RecordOutcome::EndOfInput);
    }

    /// A live source that produces silence forever.
    struct SilentLiveSource;

    impl SampleSource for SilentLiveSource {
        fn read(&mut self, out: &mut [f64]) -> Result<usize, String> {
            for s in out.iter_mut() {
                *s = 0.0;
            }
            Ok(out.len())
        }

        fn is_live(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_no_signal_timeout_on_live_source() {
        // A coarser geometry keeps the thirty simulated seconds cheap.
        let geom = Geometry::new(11_025, ZERO_FREQ).unwrap();
        let mut demod = Demodulator::new(&geom);
        let mut source = SilentLiveSource;
        let mut bytes = Vec::new();
        let outcome = demod
            .run(&mut source, &mut bytes, &mut || {})
            .unwrap();
        assert_eq!(outcome, RecordOutcome::NoSignal);
        assert!(bytes.is_empty());
    }
}
