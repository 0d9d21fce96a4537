/*!
    Pipeline controller: lifecycle, wiring, and event surfacing.
*/

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use media_types::{Demuxer, MasterClock, StreamInfo, TargetAudioFormat};

use crate::config::PipelineConfig;
use crate::device::{AudioDevice, DeviceFormat};
use crate::event::{PipelineEvent, PipelineState};
use crate::queue::PacketQueue;
use crate::renderer::{RenderState, VideoOutput};
use crate::sink::AudioSink;
use crate::stage::{
    spawn_audio_stage, spawn_source_stage, spawn_video_stage, AudioDecodeFactory,
    AudioStageHooks, VideoDecodeFactory, VideoStageHooks,
};

/// Soft deadline for a stage thread to exit after close.
const JOIN_SOFT: Duration = Duration::from_secs(2);
/// Grace period before the thread is abandoned.
const JOIN_HARD: Duration = Duration::from_secs(1);

/**
    Errors returned synchronously by the controller's operations.

    Stage failures during playback are surfaced asynchronously as
    [`PipelineEvent::ErrorOccurred`].
*/
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Media(#[from] media_types::Error),
}

/**
    The stage implementations a session runs with.

    The FFmpeg-backed `start(url)` assembles these from an RTSP session;
    tests and embedders with their own sources inject doubles through
    [`Pipeline::start_with_parts`]. Decoder factories run on the stage
    threads.
*/
pub struct PipelineParts {
    pub demuxer: Box<dyn Demuxer>,
    pub audio_decoder: Option<AudioDecodeFactory>,
    pub video_decoder: Option<VideoDecodeFactory>,
    pub audio_device: Option<Box<dyn AudioDevice>>,
}

enum ControlMsg {
    StageError {
        stage: &'static str,
        message: String,
    },
    DecoderClock(i64),
    AudioFinished,
    VideoFinished,
    Shutdown,
}

struct Shared {
    state: Mutex<PipelineState>,
    events: Sender<PipelineEvent>,
    renderer: Mutex<Option<Weak<dyn VideoOutput>>>,
    clock: Arc<MasterClock>,
    video_clock_ms: Arc<AtomicI64>,
    decoder_clock_ms: AtomicI64,
}

impl Shared {
    fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    fn set_state(&self, state: PipelineState, source: &'static str) {
        {
            // the event is sent under the state lock so transitions come
            // out of the channel totally ordered
            let mut guard = self.state.lock();
            if *guard == state {
                return;
            }
            *guard = state;
            info!(state = state.as_str(), source, "pipeline state changed");
            self.emit(PipelineEvent::StateChanged { state, source });
        }

        if let Some(renderer) = self.upgrade_renderer() {
            renderer.state_changed(render_state(state));
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }

    /**
        Step 8 of the start sequence. A very short or instantly failing
        session may already have ended or failed by the time the start
        call gets here; those states are not regressed to playing.
    */
    fn begin_playing(&self) {
        {
            let mut guard = self.state.lock();
            if matches!(*guard, PipelineState::Ended | PipelineState::Error) {
                return;
            }
            *guard = PipelineState::Playing;
            info!(state = "playing", source = "pipeline", "pipeline state changed");
            self.emit(PipelineEvent::StateChanged {
                state: PipelineState::Playing,
                source: "pipeline",
            });
        }

        if let Some(renderer) = self.upgrade_renderer() {
            renderer.state_changed(render_state(PipelineState::Playing));
        }
    }

    fn upgrade_renderer(&self) -> Option<Arc<dyn VideoOutput>> {
        self.renderer.lock().as_ref().and_then(Weak::upgrade)
    }
}

struct Session {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    audio_queue: Option<Arc<PacketQueue>>,
    video_queue: Option<Arc<PacketQueue>>,
    source_handle: Option<JoinHandle<()>>,
    audio_handle: Option<JoinHandle<()>>,
    video_handle: Option<JoinHandle<()>>,
    sink: Option<Arc<AudioSink>>,
    control_tx: Sender<ControlMsg>,
    control_handle: Option<JoinHandle<()>>,
}

/**
    The four-stage pull-and-play pipeline.

    Owns the lifecycle (`start`/`stop`/`pause`/`resume`), wires the
    stages together, brokers the master clock from the audio sink to the
    video pacer, and aggregates stage errors into one event channel.

    After a fatal stage error the controller halts the whole session; it
    never auto-restarts. The caller reissues `start`.
*/
pub struct Pipeline {
    config: PipelineConfig,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
    events_rx: Receiver<PipelineEvent>,
}

impl Pipeline {
    /**
        Create an idle pipeline.
    */
    pub fn new(config: PipelineConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Idle),
                events: events_tx,
                renderer: Mutex::new(None),
                clock: Arc::new(MasterClock::new()),
                video_clock_ms: Arc::new(AtomicI64::new(0)),
                decoder_clock_ms: AtomicI64::new(0),
            }),
            session: Mutex::new(None),
            events_rx,
        }
    }

    /**
        The controller's event channel. Events arrive in send order;
        consume from a single place.
    */
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events_rx.clone()
    }

    /**
        Attach the external renderer. Only a weak reference is held; drop
        the `Arc` to deregister.
    */
    pub fn set_video_output(&self, renderer: &Arc<dyn VideoOutput>) {
        *self.shared.renderer.lock() = Some(Arc::downgrade(renderer));
    }

    /**
        Open an RTSP session and start playback.

        Any prior session is stopped first. Fails synchronously on open
        and probe errors; decoder and device failures after this point
        surface as events.
    */
    #[cfg(feature = "ffmpeg")]
    pub fn start(&self, url: &str) -> Result<(), PipelineError> {
        use media_decode::{AudioDecoder, AudioDecoderConfig, VideoDecoder, VideoDecoderConfig};
        use media_source::{RtspSource, SourceConfig};
        use media_types::{AudioDecode, VideoDecode};

        if url.is_empty() {
            return Err(PipelineError::Configuration(
                "RTSP URL must not be empty".into(),
            ));
        }

        self.stop();
        self.shared.set_state(PipelineState::Opening, "source");

        let source_config = SourceConfig::with_timeout(self.config.connect_timeout);
        let mut source = match RtspSource::open(url, &source_config) {
            Ok(source) => source,
            Err(e) => {
                error!("failed to open {url}: {e}");
                self.shared.emit(PipelineEvent::ErrorOccurred(e.to_string()));
                self.shared.set_state(PipelineState::Error, "source");
                return Err(e.into());
            }
        };

        let audio_decoder = source.take_audio_codec_config().map(|codec_config| {
            Box::new(move |target: TargetAudioFormat| {
                AudioDecoder::new(codec_config, AudioDecoderConfig::with_target(target))
                    .map(|decoder| Box::new(decoder) as Box<dyn AudioDecode>)
            }) as AudioDecodeFactory
        });

        let target_size = self.target_size(source.stream_info());
        let hardware_decoding = self.config.hardware_decoding;
        let hw_devices = self.config.hw_devices.clone();
        let video_decoder = source.take_video_codec_config().map(|codec_config| {
            let decoder_config = VideoDecoderConfig {
                prefer_hw: hardware_decoding,
                hw_devices,
                target_width: target_size.map_or(0, |s| s.0),
                target_height: target_size.map_or(0, |s| s.1),
            };
            Box::new(move || {
                VideoDecoder::new(codec_config, decoder_config)
                    .map(|decoder| Box::new(decoder) as Box<dyn VideoDecode>)
            }) as VideoDecodeFactory
        });

        #[cfg(feature = "cpal-device")]
        let audio_device: Option<Box<dyn AudioDevice>> = source
            .stream_info()
            .has_audio()
            .then(|| Box::new(crate::device::CpalDevice::new()) as Box<dyn AudioDevice>);
        #[cfg(not(feature = "cpal-device"))]
        let audio_device: Option<Box<dyn AudioDevice>> = None;

        self.launch(PipelineParts {
            demuxer: Box::new(source),
            audio_decoder,
            video_decoder,
            audio_device,
        })
    }

    /**
        Start playback over injected stage implementations.
    */
    pub fn start_with_parts(&self, parts: PipelineParts) -> Result<(), PipelineError> {
        self.stop();
        self.shared.set_state(PipelineState::Opening, "source");
        self.launch(parts)
    }

    #[cfg(feature = "ffmpeg")]
    fn target_size(&self, info: &StreamInfo) -> Option<(u32, u32)> {
        if let Some(renderer) = self.shared.upgrade_renderer() {
            if let Some(size) = renderer.surface_size() {
                return Some(size);
            }
        }
        if let Some(size) = self.config.target_size {
            return Some(size);
        }
        info.video
            .as_ref()
            .map(|v| (v.width, v.height))
            .filter(|&(w, h)| w > 0 && h > 0)
    }

    fn launch(&self, parts: PipelineParts) -> Result<(), PipelineError> {
        let PipelineParts {
            demuxer,
            audio_decoder,
            video_decoder,
            audio_device,
        } = parts;

        let info = demuxer.stream_info().clone();
        self.shared
            .emit(PipelineEvent::StreamInfoReady(info.clone()));

        if audio_decoder.is_none() && video_decoder.is_none() {
            let message = "no decodable streams".to_string();
            self.shared
                .emit(PipelineEvent::ErrorOccurred(message.clone()));
            self.shared.set_state(PipelineState::Error, "pipeline");
            return Err(PipelineError::Configuration(message));
        }

        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));
        let (control_tx, control_rx) = unbounded::<ControlMsg>();

        // Target the audio decoder at the source's own format first.
        let source_target = TargetAudioFormat::with_fallbacks(
            info.audio.as_ref().map_or(0, |a| a.sample_rate),
            info.audio.as_ref().map_or(0, |a| a.channels),
        );

        let sink = match (audio_device, audio_decoder.is_some()) {
            (Some(device), true) => {
                let sink = Arc::new(AudioSink::new(device, Arc::clone(&self.shared.clock)));
                sink.set_queue_capacity(self.config.sink_queue_capacity);
                Some(sink)
            }
            _ => None,
        };

        // The device may adopt a different format; the decoder is then
        // retargeted at it so every frame matches the sink.
        let mut target = source_target;
        if let Some(sink) = &sink {
            let requested = DeviceFormat {
                sample_rate: source_target.sample_rate,
                channels: source_target.channels,
                sample_bits: 16,
            };
            match sink.initialize(requested) {
                Ok(adopted) => {
                    target = TargetAudioFormat {
                        sample_rate: adopted.sample_rate,
                        channels: adopted.channels,
                        format: source_target.format,
                    };
                    sink.set_volume(self.config.volume);
                }
                Err(e) => {
                    error!("audio sink init failed: {e}");
                    self.shared.emit(PipelineEvent::ErrorOccurred(e.to_string()));
                    self.shared.set_state(PipelineState::Error, "audio-sink");
                    return Err(e.into());
                }
            }

            let tx = control_tx.clone();
            sink.set_error_handler(move |message| {
                let _ = tx.send(ControlMsg::StageError {
                    stage: "audio-sink",
                    message,
                });
            });
        }

        let audio_queue = audio_decoder
            .as_ref()
            .map(|_| Arc::new(PacketQueue::new(self.config.audio_queue_capacity)));
        let video_queue = video_decoder
            .as_ref()
            .map(|_| Arc::new(PacketQueue::new(self.config.video_queue_capacity)));

        let source_handle = {
            let tx = control_tx.clone();
            spawn_source_stage(
                demuxer,
                audio_queue.clone(),
                video_queue.clone(),
                Arc::clone(&running),
                Box::new(move |message| {
                    let _ = tx.send(ControlMsg::StageError {
                        stage: "source",
                        message,
                    });
                }),
            )
        };

        let audio_handle = audio_decoder.map(|factory| {
            let queue = Arc::clone(audio_queue.as_ref().expect("audio queue exists"));
            let sink_ref = sink.clone();
            let clock_tx = control_tx.clone();
            let err_tx = control_tx.clone();
            let fin_tx = control_tx.clone();
            spawn_audio_stage(
                factory,
                target,
                queue,
                Arc::clone(&running),
                Arc::clone(&paused),
                AudioStageHooks {
                    on_frame: Box::new(move |frame| {
                        if let Some(sink) = &sink_ref {
                            sink.submit(frame);
                        }
                    }),
                    on_clock: Box::new(move |pts_ms| {
                        let _ = clock_tx.send(ControlMsg::DecoderClock(pts_ms));
                    }),
                    on_error: Box::new(move |message| {
                        let _ = err_tx.send(ControlMsg::StageError {
                            stage: "audio-decode",
                            message,
                        });
                    }),
                    on_finished: Box::new(move || {
                        let _ = fin_tx.send(ControlMsg::AudioFinished);
                    }),
                },
            )
        });

        let video_handle = video_decoder.map(|factory| {
            let queue = Arc::clone(video_queue.as_ref().expect("video queue exists"));
            let shared = Arc::clone(&self.shared);
            let err_tx = control_tx.clone();
            let fin_tx = control_tx.clone();
            spawn_video_stage(
                factory,
                info.video.as_ref().map_or(0.0, |v| v.frame_rate),
                queue,
                Arc::clone(&running),
                Arc::clone(&paused),
                Arc::clone(&self.shared.clock),
                Arc::clone(&self.shared.video_clock_ms),
                VideoStageHooks {
                    on_frame: Box::new(move |frame| {
                        if let Some(renderer) = shared.upgrade_renderer() {
                            renderer.frame_ready(frame);
                        }
                    }),
                    on_error: Box::new(move |message| {
                        let _ = err_tx.send(ControlMsg::StageError {
                            stage: "video-decode",
                            message,
                        });
                    }),
                    on_finished: Box::new(move || {
                        let _ = fin_tx.send(ControlMsg::VideoFinished);
                    }),
                },
            )
        });

        let control_handle = {
            let shared = Arc::clone(&self.shared);
            let running = Arc::clone(&running);
            let sink_ref = sink.clone();
            let audio_q = audio_queue.clone();
            let video_q = video_queue.clone();
            let audio_present = audio_handle.is_some();
            let video_present = video_handle.is_some();
            thread::spawn(move || {
                control_loop(
                    control_rx,
                    shared,
                    running,
                    audio_present,
                    video_present,
                    sink_ref,
                    audio_q,
                    video_q,
                );
            })
        };

        *self.session.lock() = Some(Session {
            running,
            paused,
            audio_queue,
            video_queue,
            source_handle: Some(source_handle),
            audio_handle,
            video_handle,
            sink: sink.clone(),
            control_tx,
            control_handle: Some(control_handle),
        });

        // C4 starts last, completing the C1..C4 start order.
        if let Some(sink) = &sink {
            if let Err(e) = sink.start() {
                error!("audio sink start failed: {e}");
                self.shared.emit(PipelineEvent::ErrorOccurred(e.to_string()));
                self.shared.set_state(PipelineState::Error, "audio-sink");
                self.stop();
                return Err(e.into());
            }
        }

        self.shared.begin_playing();
        self.shared.emit(PipelineEvent::PlaybackStarted);
        Ok(())
    }

    /**
        Stop playback and tear the session down: stages close in reverse
        start order with bounded joins, queues and clocks clear. A second
        call is a no-op.
    */
    pub fn stop(&self) {
        let Some(mut session) = self.session.lock().take() else {
            return;
        };

        // After a natural end the stages are already drained; tear down
        // quietly so a trailing stop() is observationally a no-op.
        let was_error = self.shared.state() == PipelineState::Error;
        let already_ended = self.shared.state() == PipelineState::Ended;
        if !already_ended {
            self.shared.set_state(PipelineState::Stopping, "pipeline");
        }
        session.running.store(false, Ordering::Release);

        // reverse start order: the sink first
        if let Some(sink) = &session.sink {
            sink.stop();
        }
        if let Some(queue) = &session.audio_queue {
            queue.close();
        }
        if let Some(queue) = &session.video_queue {
            queue.close();
        }

        if let Some(handle) = session.video_handle.take() {
            join_bounded(handle, "video-decode");
        }
        if let Some(handle) = session.audio_handle.take() {
            join_bounded(handle, "audio-decode");
        }
        if let Some(handle) = session.source_handle.take() {
            join_bounded(handle, "source");
        }

        let _ = session.control_tx.send(ControlMsg::Shutdown);
        if let Some(handle) = session.control_handle.take() {
            join_bounded(handle, "controller");
        }

        if let Some(queue) = &session.audio_queue {
            queue.clear();
        }
        if let Some(queue) = &session.video_queue {
            queue.clear();
        }
        self.shared.clock.reset();
        self.shared.video_clock_ms.store(0, Ordering::Release);
        self.shared.decoder_clock_ms.store(0, Ordering::Release);

        if !already_ended {
            let end_state = if was_error {
                PipelineState::Error
            } else {
                PipelineState::Ended
            };
            self.shared.set_state(end_state, "pipeline");
            self.shared.emit(PipelineEvent::PlaybackStopped);

            if let Some(renderer) = self.shared.upgrade_renderer() {
                renderer.state_changed(if was_error {
                    RenderState::Error
                } else {
                    RenderState::Idle
                });
            }
        }
    }

    /**
        Suspend playout: the device keeps its buffer, decode stages hold
        on their wait conditions, the master clock freezes.
    */
    pub fn pause(&self) {
        let session = self.session.lock();
        let Some(session) = &*session else { return };
        if self.shared.state() != PipelineState::Playing {
            return;
        }

        session.paused.store(true, Ordering::Release);
        if let Some(sink) = &session.sink {
            sink.pause();
        }
        self.shared.set_state(PipelineState::Paused, "pipeline");
    }

    /**
        Resume after a pause.
    */
    pub fn resume(&self) {
        let session = self.session.lock();
        let Some(session) = &*session else { return };
        if self.shared.state() != PipelineState::Paused {
            return;
        }

        if let Some(sink) = &session.sink {
            sink.resume();
        }
        session.paused.store(false, Ordering::Release);
        self.shared.set_state(PipelineState::Playing, "pipeline");
    }

    /**
        The master audio clock in milliseconds.
    */
    pub fn get_audio_clock(&self) -> i64 {
        self.shared.clock.millis()
    }

    /**
        The video timeline position in milliseconds.
    */
    pub fn get_video_clock(&self) -> i64 {
        self.shared.video_clock_ms.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state() == PipelineState::Playing
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /**
        Set playback volume, 0.0 to 1.0.
    */
    pub fn set_volume(&self, volume: f32) {
        if let Some(session) = &*self.session.lock() {
            if let Some(sink) = &session.sink {
                sink.set_volume(volume);
            }
        }
    }

    /**
        Device-buffer latency of the audio path in milliseconds.
    */
    pub fn audio_buffer_delay_ms(&self) -> i64 {
        self.session
            .lock()
            .as_ref()
            .and_then(|s| s.sink.as_ref().map(|sink| sink.buffer_delay_ms()))
            .unwrap_or(0)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn control_loop(
    control_rx: Receiver<ControlMsg>,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    audio_present: bool,
    video_present: bool,
    sink: Option<Arc<AudioSink>>,
    audio_queue: Option<Arc<PacketQueue>>,
    video_queue: Option<Arc<PacketQueue>>,
) {
    let mut audio_finished = !audio_present;
    let mut video_finished = !video_present;
    let mut failed = false;

    while let Ok(msg) = control_rx.recv() {
        match msg {
            ControlMsg::StageError { stage, message } => {
                error!(stage, "{message}");
                shared.emit(PipelineEvent::ErrorOccurred(message));
                if !failed {
                    failed = true;
                    shared.set_state(PipelineState::Error, stage);
                    // halt everything; the joins happen in stop()
                    running.store(false, Ordering::Release);
                    if let Some(queue) = &audio_queue {
                        queue.close();
                    }
                    if let Some(queue) = &video_queue {
                        queue.close();
                    }
                    if let Some(sink) = &sink {
                        sink.stop();
                    }
                }
            }
            ControlMsg::DecoderClock(pts_ms) => {
                debug!(pts_ms, "audio decoder clock");
                shared.decoder_clock_ms.store(pts_ms, Ordering::Release);
            }
            ControlMsg::AudioFinished => {
                audio_finished = true;
                maybe_ended(&shared, audio_finished, video_finished, failed);
            }
            ControlMsg::VideoFinished => {
                video_finished = true;
                maybe_ended(&shared, audio_finished, video_finished, failed);
            }
            ControlMsg::Shutdown => break,
        }
    }
}

fn maybe_ended(shared: &Shared, audio_finished: bool, video_finished: bool, failed: bool) {
    // Both drains may complete before the start call reaches its final
    // playing transition, hence Opening counts as live here.
    let live = matches!(
        shared.state(),
        PipelineState::Opening | PipelineState::Playing | PipelineState::Paused
    );
    if audio_finished && video_finished && !failed && live {
        shared.set_state(PipelineState::Ended, "pipeline");
    }
}

fn render_state(state: PipelineState) -> RenderState {
    match state {
        PipelineState::Idle | PipelineState::Stopping => RenderState::Idle,
        PipelineState::Opening => RenderState::Loading,
        PipelineState::Playing | PipelineState::Paused => RenderState::Playing,
        PipelineState::Ended => RenderState::Ended,
        PipelineState::Error => RenderState::Error,
    }
}

fn join_bounded(handle: JoinHandle<()>, stage: &str) {
    if wait_finished(&handle, JOIN_SOFT) {
        let _ = handle.join();
        return;
    }
    warn!(stage, "stage did not stop within the soft deadline");
    if wait_finished(&handle, JOIN_HARD) {
        let _ = handle.join();
        return;
    }
    // Threads cannot be force-terminated; the stage's timed waits let it
    // exit on its own shortly, detached.
    warn!(stage, "abandoning stage thread");
}

fn wait_finished(handle: &JoinHandle<()>, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}
