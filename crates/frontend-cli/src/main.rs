//! tape99 command line frontend.
//!
//! Drives the modem core like a cassette deck:
//!
//! - **press record** — demodulate audio (device capture or a WAV file)
//!   into a raw byte stream
//! - **press play** — modulate a raw byte stream into audio (device
//!   playback or a WAV file)
//!
//! `-` as the data argument selects the standard streams. When recording to
//! stdout the progress chatter moves to stderr so the byte stream stays
//! clean; playback never shares a stream with its data and keeps talking on
//! stdout.

use std::collections::VecDeque;
use std::env;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};

use tape99_core::{
    Demodulator, Geometry, Modulator, RecordOutcome, SampleSink, SampleSource,
    AUDIO_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, ZERO_FREQ,
};

/// Queued playback blocks kept below this many before appending more.
const MAX_QUEUED_BLOCKS: usize = 8;

// ─── WAV file adapters ──────────────────────────────────────────────────────

/// Sample source backed by a 16-bit PCM mono WAV file.
struct WavSource {
    samples: hound::WavIntoSamples<BufReader<File>, i16>,
}

impl WavSource {
    fn open(path: &str) -> Result<WavSource, String> {
        let reader = hound::WavReader::open(path).map_err(|e| format!("{}: {}", path, e))?;
        let spec = reader.spec();
        if spec.sample_rate != DEFAULT_SAMPLE_RATE {
            return Err(format!(
                "{}: {} Hz input is not supported, only {} Hz",
                path, spec.sample_rate, DEFAULT_SAMPLE_RATE
            ));
        }
        if spec.channels != 1 {
            return Err(format!(
                "{}: {}-channel input is not supported, only mono",
                path, spec.channels
            ));
        }
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(format!("{}: only 16-bit PCM input is supported", path));
        }
        Ok(WavSource { samples: reader.into_samples::<i16>() })
    }
}

impl SampleSource for WavSource {
    fn read(&mut self, out: &mut [f64]) -> Result<usize, String> {
        let mut n = 0;
        while n < out.len() {
            match self.samples.next() {
                Some(Ok(s)) => {
                    out[n] = s as f64 / 32768.0;
                    n += 1;
                }
                Some(Err(e)) => return Err(format!("reading WAV samples: {}", e)),
                None => break,
            }
        }
        Ok(n)
    }
}

/// Sample sink writing a 16-bit PCM mono WAV file.
struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: String,
}

impl WavSink {
    fn create(path: &str) -> Result<WavSink, String> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer =
            hound::WavWriter::create(path, spec).map_err(|e| format!("{}: {}", path, e))?;
        Ok(WavSink { writer: Some(writer), path: path.to_string() })
    }
}

impl SampleSink for WavSink {
    fn write(&mut self, samples: &[f64]) -> Result<(), String> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| format!("{}: WAV file already finalized", self.path))?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * 32767.0) as i16)
                .map_err(|e| format!("{}: {}", self.path, e))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), String> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| format!("{}: {}", self.path, e))?;
        }
        Ok(())
    }
}

// ─── Audio device adapters ──────────────────────────────────────────────────

/// Live capture source: a cpal input stream feeds a ring the record loop
/// drains. Capture is stereo interleaved; only the left channel is kept.
struct DeviceSource {
    ring: Arc<Mutex<VecDeque<f64>>>,
    _stream: cpal::Stream,
}

impl DeviceSource {
    fn open() -> Result<DeviceSource, String> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or("no audio input device available")?;
        let default = device
            .default_input_config()
            .map_err(|e| format!("querying input device: {}", e))?;
        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(DEFAULT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = Arc::new(Mutex::new(VecDeque::with_capacity(AUDIO_BUFFER_SIZE * 4)));
        let stream = match default.sample_format() {
            cpal::SampleFormat::F32 => build_capture::<f32>(&device, &config, ring.clone()),
            cpal::SampleFormat::I16 => build_capture::<i16>(&device, &config, ring.clone()),
            cpal::SampleFormat::U16 => build_capture::<u16>(&device, &config, ring.clone()),
            format => return Err(format!("unsupported capture sample format: {}", format)),
        }?;
        stream
            .play()
            .map_err(|e| format!("starting capture stream: {}", e))?;
        Ok(DeviceSource { ring, _stream: stream })
    }
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<Mutex<VecDeque<f64>>>,
) -> Result<cpal::Stream, String>
where
    T: SizedSample,
    f64: FromSample<T>,
{
    let channels = config.channels as usize;
    // cpal recovers from overruns on its own; anything it reports here is
    // informational and the stream keeps running.
    let err_fn = |err| eprintln!("Warning: capture stream: {}", err);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if let Ok(mut ring) = ring.lock() {
                    for frame in data.chunks(channels) {
                        ring.push_back(frame[0].to_sample::<f64>());
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| format!("opening capture stream: {}", e))
}

impl SampleSource for DeviceSource {
    fn read(&mut self, out: &mut [f64]) -> Result<usize, String> {
        let mut n = 0;
        while n < out.len() {
            {
                let mut ring = self
                    .ring
                    .lock()
                    .map_err(|_| "capture thread panicked".to_string())?;
                while n < out.len() {
                    match ring.pop_front() {
                        Some(s) => {
                            out[n] = s;
                            n += 1;
                        }
                        None => break,
                    }
                }
            }
            if n < out.len() {
                thread::sleep(Duration::from_millis(2));
            }
        }
        Ok(n)
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// Playback sink: samples queue onto a rodio sink in half-buffer blocks,
/// with back-pressure once enough blocks are waiting. `finish` drains the
/// queue so the final half-wave is heard before the device closes.
struct DeviceSink {
    _stream: rodio::OutputStream,
    sink: rodio::Sink,
    pending: Vec<f32>,
}

impl DeviceSink {
    fn open() -> Result<DeviceSink, String> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| format!("opening audio output: {}", e))?;
        let sink =
            rodio::Sink::try_new(&handle).map_err(|e| format!("creating audio sink: {}", e))?;
        Ok(DeviceSink {
            _stream: stream,
            sink,
            pending: Vec::with_capacity(AUDIO_BUFFER_SIZE),
        })
    }

    fn flush_block(&mut self, len: usize) {
        while self.sink.len() > MAX_QUEUED_BLOCKS {
            thread::sleep(Duration::from_millis(5));
        }
        let block: Vec<f32> = self.pending.drain(..len).collect();
        self.sink
            .append(rodio::buffer::SamplesBuffer::new(1, DEFAULT_SAMPLE_RATE, block));
    }
}

impl SampleSink for DeviceSink {
    fn write(&mut self, samples: &[f64]) -> Result<(), String> {
        self.pending.extend(samples.iter().map(|&s| s as f32));
        while self.pending.len() >= AUDIO_BUFFER_SIZE / 2 {
            self.flush_block(AUDIO_BUFFER_SIZE / 2);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), String> {
        if !self.pending.is_empty() {
            let len = self.pending.len();
            self.flush_block(len);
        }
        self.sink.sleep_until_end();
        Ok(())
    }
}

// ─── Entry point ────────────────────────────────────────────────────────────

fn usage(prog: &str) -> ! {
    eprintln!("tape99 - TI-99/4A data cassette software modem");
    eprintln!();
    eprintln!("Usage: {} press record <data-out> [<wav-in>]", prog);
    eprintln!("       {} press play <data-in> [<wav-out>]", prog);
    eprintln!();
    eprintln!("  '-' as <data-out> or <data-in> selects the standard streams.");
    eprintln!("  Without a WAV path, the audio device is used instead.");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 || args.len() > 5 || args[1] != "press" {
        usage(args.first().map(String::as_str).unwrap_or("tape99"));
    }
    let data = args[3].as_str();
    let wav = args.get(4).map(String::as_str);

    let result = match args[2].as_str() {
        "record" => press_record(data, wav),
        "play" => press_play(data, wav),
        _ => usage(&args[0]),
    };
    match result {
        Ok(code) => process::exit(code),
        Err(message) => {
            eprintln!("{}", message);
            process::exit(1);
        }
    }
}

fn press_record(data: &str, wav: Option<&str>) -> Result<i32, String> {
    let to_stderr = data == "-";
    let say = |msg: &str| {
        if to_stderr {
            eprintln!("{}", msg);
        } else {
            println!("{}", msg);
        }
    };
    let data_name = if data == "-" { "stdout" } else { data };

    let mut source: Box<dyn SampleSource> = match wav {
        Some(path) => {
            say(&format!("Recording {} to {}", path, data_name));
            Box::new(WavSource::open(path)?)
        }
        None => {
            say(&format!("Recording to {}", data_name));
            Box::new(DeviceSource::open()?)
        }
    };
    let mut data_out: Box<dyn Write> = match data {
        "-" => Box::new(io::stdout()),
        path => Box::new(BufWriter::new(
            File::create(path).map_err(|e| format!("{}: {}", path, e))?,
        )),
    };

    let geom = Geometry::new(DEFAULT_SAMPLE_RATE, ZERO_FREQ)?;
    let mut demod = Demodulator::new(&geom);
    let outcome = demod.run(&mut *source, &mut *data_out, &mut || say("Got a signal!"))?;

    if outcome == RecordOutcome::NoSignal {
        say("No signal found. Giving up.");
    }
    say("Done!");
    Ok(if outcome == RecordOutcome::NoSignal { 1 } else { 0 })
}

fn press_play(data: &str, wav: Option<&str>) -> Result<i32, String> {
    // Playback reads its data from stdin at most; stdout stays free for
    // progress, so nothing moves to stderr here.
    let say = |msg: &str| println!("{}", msg);
    let data_name = if data == "-" { "stdin" } else { data };

    let mut data_in: Box<dyn Read> = match data {
        "-" => Box::new(io::stdin()),
        path => Box::new(BufReader::new(
            File::open(path).map_err(|e| format!("{}: {}", path, e))?,
        )),
    };
    let mut sink: Box<dyn SampleSink> = match wav {
        Some(path) => {
            say(&format!("Playing {} to {}", data_name, path));
            Box::new(WavSink::create(path)?)
        }
        None => {
            say(&format!("Playing {}", data_name));
            Box::new(DeviceSink::open()?)
        }
    };

    let geom = Geometry::new(DEFAULT_SAMPLE_RATE, ZERO_FREQ)?;
    let mut modulator = Modulator::new(&geom)?;
    modulator.play(&mut *data_in, &mut *sink)?;
    Ok(0)
}
