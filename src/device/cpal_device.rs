/*!
    Sound device backed by cpal.

    The byte-oriented device contract is realized over a SPSC byte ring:
    `write` pushes into the ring, `bytes_free` is the ring's vacancy, and
    the cpal output callback drains it. The cpal stream itself is not
    `Send`, so it lives on a dedicated thread driven by a command channel.
*/

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use tracing::{error, info, warn};

use media_types::{Error, Result};

use super::{AudioDevice, DeviceFormat};

/// Atomic f32 wrapper for thread-safe volume control
struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }
}

enum StreamCmd {
    Play,
    Pause,
    Shutdown,
}

struct StreamShared {
    error: Mutex<Option<String>>,
    clear_requested: AtomicBool,
}

/**
    cpal-backed implementation of [`AudioDevice`].
*/
pub struct CpalDevice {
    format: Option<DeviceFormat>,
    stream_config: Option<(cpal::StreamConfig, cpal::SampleFormat)>,
    buffer_size: usize,
    producer: Option<HeapProd<u8>>,
    pending_consumer: Option<HeapCons<u8>>,
    volume: Arc<AtomicF32>,
    shared: Arc<StreamShared>,
    cmd_tx: Option<Sender<StreamCmd>>,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            format: None,
            stream_config: None,
            buffer_size: 0,
            producer: None,
            pending_consumer: None,
            volume: Arc::new(AtomicF32::new(1.0)),
            shared: Arc::new(StreamShared {
                error: Mutex::new(None),
                clear_requested: AtomicBool::new(false),
            }),
            cmd_tx: None,
            stream_thread: None,
        }
    }

    fn start_stream_thread(&mut self) {
        let Some((config, sample_format)) = self.stream_config.clone() else {
            warn!("audio device resumed before init");
            return;
        };
        let Some(consumer) = self.pending_consumer.take() else {
            warn!("audio device resumed before its buffer was sized");
            return;
        };

        let (cmd_tx, cmd_rx) = unbounded();
        let volume = Arc::clone(&self.volume);
        let shared = Arc::clone(&self.shared);

        self.cmd_tx = Some(cmd_tx);
        self.stream_thread = Some(thread::spawn(move || {
            run_stream(config, sample_format, consumer, volume, shared, cmd_rx);
        }));
    }

    fn send_cmd(&self, cmd: StreamCmd) {
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(cmd);
        }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for CpalDevice {
    fn init(&mut self, requested: DeviceFormat) -> Result<DeviceFormat> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::device("no output device available"))?;

        let (config, sample_format, adopted) = nearest_config(&device, requested)?;

        if adopted != requested {
            info!(
                requested_rate = requested.sample_rate,
                requested_channels = requested.channels,
                adopted_rate = adopted.sample_rate,
                adopted_channels = adopted.channels,
                "requested audio format not supported, using nearest match"
            );
        }

        self.format = Some(adopted);
        self.stream_config = Some((config, sample_format));
        Ok(adopted)
    }

    fn set_buffer_size(&mut self, bytes: usize) {
        let ring = HeapRb::<u8>::new(bytes);
        let (producer, consumer) = ring.split();
        self.producer = Some(producer);
        self.pending_consumer = Some(consumer);
        self.buffer_size = bytes;
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn bytes_free(&self) -> usize {
        self.producer.as_ref().map(|p| p.vacant_len()).unwrap_or(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.producer {
            Some(producer) => Ok(producer.push_slice(data)),
            None => Err(Error::device("device buffer not configured")),
        }
    }

    fn suspend(&mut self) {
        self.send_cmd(StreamCmd::Pause);
    }

    fn resume(&mut self) {
        if self.stream_thread.is_none() {
            self.start_stream_thread();
        } else {
            self.send_cmd(StreamCmd::Play);
        }
    }

    fn stop(&mut self) {
        // The callback drains and discards whatever is still buffered.
        self.shared.clear_requested.store(true, Ordering::Release);
        self.send_cmd(StreamCmd::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.0));
    }

    fn take_error(&mut self) -> Option<String> {
        self.shared.error.lock().take()
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.send_cmd(StreamCmd::Shutdown);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

/**
    Pick a stream configuration for the requested format, or the nearest
    supported one.
*/
fn nearest_config(
    device: &cpal::Device,
    requested: DeviceFormat,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat, DeviceFormat)> {
    let mut fallback: Option<cpal::SupportedStreamConfigRange> = None;

    if let Ok(ranges) = device.supported_output_configs() {
        for range in ranges {
            if !matches!(
                range.sample_format(),
                cpal::SampleFormat::I16 | cpal::SampleFormat::F32
            ) {
                continue;
            }

            if range.channels() == requested.channels
                && range.min_sample_rate().0 <= requested.sample_rate
                && requested.sample_rate <= range.max_sample_rate().0
            {
                let supported = range.with_sample_rate(cpal::SampleRate(requested.sample_rate));
                let sample_format = supported.sample_format();
                return Ok((
                    supported.config(),
                    sample_format,
                    DeviceFormat {
                        sample_rate: requested.sample_rate,
                        channels: requested.channels,
                        sample_bits: 16,
                    },
                ));
            }

            if fallback.is_none() {
                fallback = Some(range);
            }
        }
    }

    if let Some(range) = fallback {
        let rate = requested
            .sample_rate
            .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
        let channels = range.channels();
        let supported = range.with_sample_rate(cpal::SampleRate(rate));
        let sample_format = supported.sample_format();
        return Ok((
            supported.config(),
            sample_format,
            DeviceFormat {
                sample_rate: rate,
                channels,
                sample_bits: 16,
            },
        ));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::device(e.to_string()))?;
    let adopted = DeviceFormat {
        sample_rate: default.sample_rate().0,
        channels: default.channels(),
        sample_bits: 16,
    };
    Ok((default.config(), default.sample_format(), adopted))
}

/**
    Owns the cpal stream for its whole life; parks on the command channel.
*/
fn run_stream(
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mut consumer: HeapCons<u8>,
    volume: Arc<AtomicF32>,
    shared: Arc<StreamShared>,
    cmd_rx: Receiver<StreamCmd>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        *shared.error.lock() = Some("output device disappeared".into());
        return;
    };

    let err_shared = Arc::clone(&shared);
    let err_fn = move |e: cpal::StreamError| {
        error!("audio stream error: {e}");
        *err_shared.error.lock() = Some(e.to_string());
    };

    let cb_shared = Arc::clone(&shared);
    let mut scratch: Vec<u8> = Vec::new();

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |output: &mut [i16], _| {
                drain_if_requested(&cb_shared, &mut consumer);
                fill_from_ring(output, &mut consumer, &mut scratch, volume.load(), |s, v| {
                    (f32::from(s) * v) as i16
                });
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |output: &mut [f32], _| {
                drain_if_requested(&cb_shared, &mut consumer);
                fill_from_ring(output, &mut consumer, &mut scratch, volume.load(), |s, v| {
                    f32::from(s) / 32768.0 * v
                });
            },
            err_fn,
            None,
        ),
        other => {
            *shared.error.lock() = Some(format!("unsupported device sample format: {other}"));
            return;
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            *shared.error.lock() = Some(format!("failed to start audio output: {e}"));
            return;
        }
    };

    if let Err(e) = stream.play() {
        *shared.error.lock() = Some(format!("failed to start audio output: {e}"));
        return;
    }

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            StreamCmd::Play => {
                if let Err(e) = stream.play() {
                    *shared.error.lock() = Some(e.to_string());
                }
            }
            StreamCmd::Pause => {
                if let Err(e) = stream.pause() {
                    *shared.error.lock() = Some(e.to_string());
                }
            }
            StreamCmd::Shutdown => break,
        }
    }
}

fn drain_if_requested(shared: &StreamShared, consumer: &mut HeapCons<u8>) {
    if shared.clear_requested.swap(false, Ordering::AcqRel) {
        let mut sink = [0u8; 256];
        while consumer.pop_slice(&mut sink) > 0 {}
    }
}

/**
    Fill an output buffer from S16LE ring bytes, converting and applying
    volume; pads with silence when the ring runs dry.
*/
fn fill_from_ring<T: Copy + Default>(
    output: &mut [T],
    consumer: &mut HeapCons<u8>,
    scratch: &mut Vec<u8>,
    volume: f32,
    convert: impl Fn(i16, f32) -> T,
) {
    scratch.resize(output.len() * 2, 0);
    let read_bytes = consumer.pop_slice(scratch);
    let read_samples = read_bytes / 2;

    for (i, out) in output.iter_mut().take(read_samples).enumerate() {
        let sample = i16::from_le_bytes([scratch[2 * i], scratch[2 * i + 1]]);
        *out = convert(sample, volume);
    }
    for out in output.iter_mut().skip(read_samples) {
        *out = T::default();
    }
}
