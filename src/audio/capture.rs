use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::error::CaptureError;
use crate::kernel::telemetry::{FaultReporter, Stage};

/// Rates the webrtc VAD accepts, in order of preference.
pub const VAD_RATES: [u32; 4] = [16000, 32000, 48000, 8000];

/// Half a second of headroom at 16 kHz.
const RING_CAPACITY: usize = 8192;

/// Blocking source of fixed-size mono frames.
pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;

    /// Fills `frame` completely or fails. `CaptureError::Exhausted` means the
    /// source ended normally.
    fn read_frame(&mut self, frame: &mut [i16]) -> Result<(), CaptureError>;
}

/// Microphone input via cpal. Holds the stream; dropping it stops capture.
pub struct MicrophoneCapture {
    _stream: cpal::Stream,
    pub sample_rate: u32,
}

impl MicrophoneCapture {
    /// Opens the default input device and returns the capture plus the frame
    /// source that drains it.
    pub fn open(stall_timeout: Duration, faults: FaultReporter) -> Result<(Self, RingBufferSource<ringbuf::HeapCons<f32>>), CaptureError> {
        let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        let capture = Self::start(producer, faults)?;
        let source = RingBufferSource::new(consumer, capture.sample_rate, stall_timeout);
        Ok((capture, source))
    }

    pub fn start<P>(mut producer: P, faults: FaultReporter) -> Result<Self, CaptureError>
    where
        P: Producer<Item = f32> + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoInputDevice)?;
        info!("Audio input device: {}", device.name().unwrap_or_default());

        let mut selected = None;
        for &rate in &VAD_RATES {
            let ranges = device
                .supported_input_configs()
                .map_err(|e| CaptureError::Device(e.to_string()))?;
            selected = ranges
                .into_iter()
                .find(|r| r.min_sample_rate().0 <= rate && r.max_sample_rate().0 >= rate)
                .map(|r| (r.with_sample_rate(cpal::SampleRate(rate)), rate));
            if selected.is_some() {
                break;
            }
        }

        let (config, sample_rate) = match selected {
            Some(found) => found,
            None => {
                let default = device
                    .default_input_config()
                    .map_err(|e| CaptureError::Device(e.to_string()))?;
                let rate = default.sample_rate().0;
                if !VAD_RATES.contains(&rate) {
                    return Err(CaptureError::UnsupportedSampleRate(rate));
                }
                (default, rate)
            }
        };

        let channels = config.channels().max(1) as usize;
        info!(sample_rate, channels, "Audio config selected");

        let err_fn = move |err: cpal::StreamError| {
            error!("Audio stream error: {}", err);
            faults.report(Stage::Capture, err.to_string());
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| write_f32(data, channels, &mut producer),
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| write_i16(data, channels, &mut producer),
                err_fn,
                None,
            ),
            _ => return Err(CaptureError::UnsupportedFormat),
        }
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

        stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }
}

// Lossy when the ring is full: the callback must never block.
fn write_f32<P: Producer<Item = f32>>(input: &[f32], channels: usize, producer: &mut P) {
    if channels == 1 {
        producer.push_slice(input);
        return;
    }
    for frame in input.chunks(channels) {
        let _ = producer.try_push(frame[0]);
    }
}

fn write_i16<P: Producer<Item = f32>>(input: &[i16], channels: usize, producer: &mut P) {
    for frame in input.chunks(channels) {
        let _ = producer.try_push(frame[0] as f32 / i16::MAX as f32);
    }
}

/// Pulls frames out of the ring the capture callback fills.
pub struct RingBufferSource<C> {
    consumer: C,
    sample_rate: u32,
    stall_timeout: Duration,
    scratch: Vec<f32>,
}

impl<C> RingBufferSource<C>
where
    C: Consumer<Item = f32> + Send,
{
    pub fn new(consumer: C, sample_rate: u32, stall_timeout: Duration) -> Self {
        Self {
            consumer,
            sample_rate,
            stall_timeout,
            scratch: Vec::new(),
        }
    }
}

impl<C> AudioSource for RingBufferSource<C>
where
    C: Consumer<Item = f32> + Send,
{
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self, frame: &mut [i16]) -> Result<(), CaptureError> {
        let waiting_since = Instant::now();
        while self.consumer.occupied_len() < frame.len() {
            if waiting_since.elapsed() > self.stall_timeout {
                return Err(CaptureError::Stream(format!(
                    "no audio for {} ms",
                    self.stall_timeout.as_millis()
                )));
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        self.scratch.resize(frame.len(), 0.0);
        self.consumer.pop_slice(&mut self.scratch);
        for (out, &sample) in frame.iter_mut().zip(&self.scratch) {
            *out = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_source_converts_to_i16() {
        let (mut producer, consumer) = HeapRb::<f32>::new(64).split();
        producer.push_slice(&[0.0, 1.0, -1.0, 2.0]);
        let mut source = RingBufferSource::new(consumer, 16_000, Duration::from_millis(50));

        let mut frame = [0i16; 4];
        source.read_frame(&mut frame).unwrap();
        assert_eq!(frame, [0, i16::MAX, -i16::MAX, i16::MAX]);
    }

    #[test]
    fn ring_source_reports_stall() {
        let (_producer, consumer) = HeapRb::<f32>::new(64).split();
        let mut source = RingBufferSource::new(consumer, 16_000, Duration::from_millis(20));
        let mut frame = [0i16; 8];
        assert!(matches!(source.read_frame(&mut frame), Err(CaptureError::Stream(_))));
    }
}
