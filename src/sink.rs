/*!
    Audio sink: PCM playout and the byte-accurate master clock.
*/

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use media_types::{AudioFrame, Error, MasterClock, Result};

use crate::device::{AudioDevice, DeviceFormat};

/// Samples per device frame used for buffer sizing.
const SAMPLES_PER_DEVICE_FRAME: usize = 1024;

/// Poll interval standing in for the device's below-watermark notification.
const NOTIFY_INTERVAL: Duration = Duration::from_millis(10);

/// Default cap on pending PCM chunks.
pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 6144;

type ErrorHandler = Box<dyn Fn(String) + Send + Sync>;

/// A frame awaiting playout. Partially written chunks retain their
/// remainder in place at the queue head.
struct PendingChunk {
    frame: Arc<AudioFrame>,
    offset: usize,
}

struct SinkInner {
    device: Box<dyn AudioDevice>,
    format: DeviceFormat,
    queue: VecDeque<PendingChunk>,
    queue_capacity: usize,
    bytes_written: u64,
    initialized: bool,
}

/**
    Consumes decoded PCM frames and feeds the output device, publishing a
    master clock that reflects bytes that have actually left the device
    buffer.

    Two triggers drive the write routine: the 10 ms poll thread and the
    arrival of a new frame. Both serialize on the buffer lock.
*/
pub struct AudioSink {
    inner: Arc<Mutex<SinkInner>>,
    clock: Arc<MasterClock>,
    playing: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
    on_error: Arc<Mutex<Option<ErrorHandler>>>,
}

impl AudioSink {
    /**
        Create a sink over the given device, publishing to the given clock.
    */
    pub fn new(device: Box<dyn AudioDevice>, clock: Arc<MasterClock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkInner {
                device,
                format: DeviceFormat {
                    sample_rate: 0,
                    channels: 0,
                    sample_bits: 16,
                },
                queue: VecDeque::new(),
                queue_capacity: DEFAULT_SINK_QUEUE_CAPACITY,
                bytes_written: 0,
                initialized: false,
            })),
            clock,
            playing: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            poll_thread: Mutex::new(None),
            on_error: Arc::new(Mutex::new(None)),
        }
    }

    /**
        Cap the pending-chunk queue. Oldest chunks are discarded with a
        warning past this.
    */
    pub fn set_queue_capacity(&self, capacity: usize) {
        self.inner.lock().queue_capacity = capacity;
    }

    /**
        Install the handler fatal device errors are surfaced through.
    */
    pub fn set_error_handler(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        *self.on_error.lock() = Some(Box::new(handler));
    }

    /**
        Initialize the device with the requested format and size its
        buffer. Returns the adopted format, which may be the device's
        nearest supported match; all byte arithmetic uses it from here on.
    */
    pub fn initialize(&self, requested: DeviceFormat) -> Result<DeviceFormat> {
        let mut inner = self.inner.lock();
        let adopted = inner.device.init(requested)?;

        let frame_bytes = SAMPLES_PER_DEVICE_FRAME
            * adopted.channels as usize
            * (adopted.sample_bits as usize / 8);
        let buffer_size = (frame_bytes * 3).clamp(frame_bytes * 2, frame_bytes * 6);
        inner.device.set_buffer_size(buffer_size);

        inner.format = adopted;
        inner.initialized = true;

        info!(
            sample_rate = adopted.sample_rate,
            channels = adopted.channels,
            sample_bits = adopted.sample_bits,
            buffer_size,
            "audio sink initialized"
        );

        Ok(adopted)
    }

    /**
        Start playout: resets the byte counter and the clock, resumes the
        device, and spawns the poll thread.
    */
    pub fn start(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if !inner.initialized {
                return Err(Error::device("audio sink not initialized"));
            }
            if self.playing.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            self.paused.store(false, Ordering::Release);
            inner.bytes_written = 0;
            self.clock.reset();
            inner.device.resume();
        }

        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        let playing = Arc::clone(&self.playing);
        let paused = Arc::clone(&self.paused);
        let on_error = Arc::clone(&self.on_error);

        *self.poll_thread.lock() = Some(thread::spawn(move || {
            while playing.load(Ordering::Acquire) {
                thread::sleep(NOTIFY_INTERVAL);
                if paused.load(Ordering::Acquire) {
                    continue;
                }

                let mut inner = inner.lock();
                if let Some(message) = inner.device.take_error() {
                    error!("audio device failed: {message}");
                    if let Some(handler) = &*on_error.lock() {
                        handler(message);
                    }
                    playing.store(false, Ordering::Release);
                    break;
                }

                if let Some(message) = write_pending(&mut inner, &clock) {
                    error!("audio write failed: {message}");
                    if let Some(handler) = &*on_error.lock() {
                        handler(message);
                    }
                    playing.store(false, Ordering::Release);
                    break;
                }
            }
        }));

        info!("audio playback started, waiting for audio data");
        Ok(())
    }

    /**
        Enqueue a decoded frame for playout.

        Frames are accepted while stopped too (they queue up to the cap),
        so a late-started sink picks up the backlog without loss.
    */
    pub fn submit(&self, frame: Arc<AudioFrame>) {
        let mut inner = self.inner.lock();

        if inner.initialized
            && (frame.sample_rate != inner.format.sample_rate
                || frame.channels != inner.format.channels)
        {
            warn!(
                frame_rate = frame.sample_rate,
                frame_channels = frame.channels,
                sink_rate = inner.format.sample_rate,
                sink_channels = inner.format.channels,
                "audio frame format does not match the sink"
            );
        }

        if inner.queue.len() >= inner.queue_capacity {
            inner.queue.pop_front();
            warn!("audio buffer overflow, dropping oldest chunk");
        }
        inner.queue.push_back(PendingChunk { frame, offset: 0 });

        if self.playing.load(Ordering::Acquire) && !self.paused.load(Ordering::Acquire) {
            if let Some(message) = write_pending(&mut inner, &self.clock) {
                error!("audio write failed: {message}");
                drop(inner);
                if let Some(handler) = &*self.on_error.lock() {
                    handler(message);
                }
            }
        }
    }

    /**
        Suspend the device, retaining its buffer, and hold writes.
    */
    pub fn pause(&self) {
        if !self.playing.load(Ordering::Acquire) || self.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.lock().device.suspend();
        info!("audio playback paused");
    }

    /**
        Resume the device and writes after a pause.
    */
    pub fn resume(&self) {
        if !self.playing.load(Ordering::Acquire) || !self.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.lock().device.resume();
        info!("audio playback resumed");
    }

    /**
        Stop playout: drains the pending queue, stops the device, and
        resets the byte counter and the clock to zero. A second call is a
        no-op.
    */
    pub fn stop(&self) {
        if !self.playing.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.poll_thread.lock().take() {
            let _ = handle.join();
        }

        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.device.stop();
        inner.bytes_written = 0;
        self.paused.store(false, Ordering::Release);
        self.clock.reset();

        info!("audio playback stopped");
    }

    /**
        The master clock position in milliseconds.
    */
    pub fn clock_ms(&self) -> i64 {
        self.clock.millis()
    }

    /**
        Device-buffer latency in milliseconds at the adopted format.
    */
    pub fn buffer_delay_ms(&self) -> i64 {
        let inner = self.inner.lock();
        let bytes_per_ms = inner.format.bytes_per_ms();
        if bytes_per_ms <= 0.0 {
            return 0;
        }
        (inner.device.buffer_size() as f64 / bytes_per_ms) as i64
    }

    /**
        Set playback volume, clamped to 0.0..=1.0.
    */
    pub fn set_volume(&self, volume: f32) {
        self.inner.lock().device.set_volume(volume.clamp(0.0, 1.0));
    }

    /**
        The adopted device format, if initialized.
    */
    pub fn format(&self) -> Option<DeviceFormat> {
        let inner = self.inner.lock();
        inner.initialized.then_some(inner.format)
    }

    /**
        Pending chunks awaiting playout.
    */
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.stop();
    }
}

// The sink is shared between the controller, the audio stage, and its
// own poll thread.
static_assertions::assert_impl_all!(AudioSink: Send, Sync);

/**
    Write queued chunks into the device, aligned to whole sample groups,
    then derive and publish the clock:

    `played = max(0, bytes_written - (buffer_size - bytes_free))`, in
    milliseconds at the adopted byte rate.

    Returns an error message on device write failure.
*/
fn write_pending(inner: &mut SinkInner, clock: &MasterClock) -> Option<String> {
    let group = inner.format.sample_group_bytes();
    if group == 0 {
        return None;
    }

    let mut wrote_any = false;
    loop {
        let free = inner.device.bytes_free();
        if free < group * 2 {
            break; // wait for more space
        }

        let Some(chunk) = inner.queue.front_mut() else {
            break;
        };

        let remaining = chunk.frame.data.len() - chunk.offset;
        let to_write = (remaining.min(free) / group) * group;
        if to_write == 0 {
            // tail shorter than one sample group cannot play; discard it
            inner.queue.pop_front();
            continue;
        }

        let written = match inner
            .device
            .write(&chunk.frame.data[chunk.offset..chunk.offset + to_write])
        {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Some(e.to_string()),
        };

        inner.bytes_written += written as u64;
        chunk.offset += written;
        wrote_any = true;

        if chunk.offset >= chunk.frame.data.len() {
            inner.queue.pop_front();
        }
        if written < to_write {
            break;
        }
    }

    if wrote_any {
        let buffered = inner
            .device
            .buffer_size()
            .saturating_sub(inner.device.bytes_free()) as u64;
        let played = inner.bytes_written.saturating_sub(buffered);
        let bytes_per_ms = inner.format.bytes_per_ms();
        if bytes_per_ms > 0.0 {
            clock.publish((played as f64 / bytes_per_ms) as i64);
        }
    }

    None
}
