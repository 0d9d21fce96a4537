//! End-to-end pipeline scenarios over scripted stage doubles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use rtspull::device::{AudioDevice, DeviceFormat};
use rtspull::stage::{AudioDecodeFactory, VideoDecodeFactory};
use rtspull::types::{
    AudioDecode, AudioFrame, AudioStreamInfo, Demuxer, Error, Packet, Pts, Rational, Result,
    SampleFormat, StreamInfo, StreamType, TargetAudioFormat, VideoDecode, VideoFrame,
    VideoStreamInfo,
};
use rtspull::{
    Pipeline, PipelineConfig, PipelineEvent, PipelineParts, PipelineState, RenderState,
    VideoOutput,
};

// ─── doubles ────────────────────────────────────────────────────────────

/// Demuxer scripted from a pre-built packet list. In paced mode reads
/// block until each packet's PTS, emulating a live network source.
struct MockDemuxer {
    info: StreamInfo,
    packets: Mutex<VecDeque<Result<Option<Packet>>>>,
    paced: bool,
    started: Option<Instant>,
}

impl Demuxer for MockDemuxer {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        let next = self.packets.lock().unwrap().pop_front().unwrap_or(Ok(None));

        if self.paced {
            if let Ok(Some(packet)) = &next {
                if let Some(pts_ms) = packet.pts_millis() {
                    let started = *self.started.get_or_insert_with(Instant::now);
                    let due = started + Duration::from_millis(pts_ms as u64);
                    if let Some(wait) = due.checked_duration_since(Instant::now()) {
                        std::thread::sleep(wait);
                    }
                }
            }
        }

        next
    }
}

fn video_info() -> VideoStreamInfo {
    VideoStreamInfo {
        width: 1280,
        height: 720,
        frame_rate: 25.0,
        codec: "h264".into(),
        time_base: Rational::MILLIS,
    }
}

fn audio_info(sample_rate: u32) -> AudioStreamInfo {
    AudioStreamInfo {
        sample_rate,
        channels: 2,
        codec: "aac".into(),
        time_base: Rational::MILLIS,
    }
}

/// One video packet per 40 ms and one audio packet per 20 ms, interleaved
/// by PTS, ending in EOF.
fn av_demuxer(duration_ms: i64, with_video: bool, with_audio: bool) -> MockDemuxer {
    let mut timed: Vec<(i64, Packet)> = Vec::new();

    if with_video {
        for n in 0..duration_ms / 40 {
            let pts = n * 40;
            timed.push((
                pts,
                Packet::new(
                    vec![0x56u8; 64],
                    Some(Pts(pts)),
                    Rational::MILLIS,
                    n % 25 == 0,
                    StreamType::Video,
                ),
            ));
        }
    }
    if with_audio {
        for n in 0..duration_ms / 20 {
            let pts = n * 20;
            timed.push((
                pts,
                Packet::new(
                    vec![0xAAu8; 32],
                    Some(Pts(pts)),
                    Rational::MILLIS,
                    true,
                    StreamType::Audio,
                ),
            ));
        }
    }
    timed.sort_by_key(|(pts, _)| *pts);

    let packets = timed.into_iter().map(|(_, p)| Ok(Some(p))).collect();
    MockDemuxer {
        info: StreamInfo {
            video: with_video.then(video_info),
            audio: with_audio.then(|| audio_info(44_100)),
        },
        packets: Mutex::new(packets),
        paced: false,
        started: None,
    }
}

/// Same stream, delivered in real time like a live source.
fn paced_av_demuxer(duration_ms: i64, with_video: bool, with_audio: bool) -> MockDemuxer {
    MockDemuxer {
        paced: true,
        ..av_demuxer(duration_ms, with_video, with_audio)
    }
}

/// Decoder double: one 20 ms PCM frame per packet at the configured
/// target format.
struct MockAudioDecode {
    target: TargetAudioFormat,
}

impl AudioDecode for MockAudioDecode {
    fn set_target_format(&mut self, target: TargetAudioFormat) -> Result<()> {
        self.target = target;
        Ok(())
    }

    fn target_format(&self) -> TargetAudioFormat {
        self.target
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<AudioFrame>> {
        let samples = (self.target.sample_rate / 50) as usize;
        Ok(vec![AudioFrame::new(
            vec![0u8; samples * self.target.sample_group_bytes()],
            samples,
            self.target.sample_rate,
            self.target.channels,
            SampleFormat::S16,
            packet.pts_millis().unwrap_or(0),
        )])
    }

    fn flush(&mut self) -> Result<Vec<AudioFrame>> {
        Ok(Vec::new())
    }
}

fn audio_factory(seen_target: Arc<Mutex<Option<TargetAudioFormat>>>) -> AudioDecodeFactory {
    Box::new(move |target| {
        *seen_target.lock().unwrap() = Some(target);
        Ok(Box::new(MockAudioDecode { target }) as Box<dyn AudioDecode>)
    })
}

/// Decoder double: one RGBA frame per packet at 1280x720.
struct MockVideoDecode;

impl VideoDecode for MockVideoDecode {
    fn set_target_size(&mut self, _width: u32, _height: u32) {}

    fn decode(&mut self, packet: &Packet) -> Result<Vec<VideoFrame>> {
        Ok(vec![VideoFrame::new(
            vec![0u8; 1280 * 720 * 4],
            1280,
            720,
            1280 * 4,
            packet.pts_millis().unwrap_or(0),
        )])
    }

    fn flush(&mut self) -> Result<Vec<VideoFrame>> {
        Ok(Vec::new())
    }
}

fn video_factory() -> VideoDecodeFactory {
    Box::new(|| Ok(Box::new(MockVideoDecode) as Box<dyn VideoDecode>))
}

/// Sound device double. In real-time mode buffered bytes play out at the
/// adopted byte rate; in instant mode everything written is played at
/// once, racing the audio clock far ahead of wall time.
#[derive(Clone)]
struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

struct DeviceState {
    supported: DeviceFormat,
    buffer_size: usize,
    held: f64,
    last_drain: Instant,
    suspended: bool,
    instant_playout: bool,
    volume: f32,
    fail_writes: bool,
}

impl MockDevice {
    fn realtime(supported: DeviceFormat) -> Self {
        Self::build(supported, false)
    }

    fn instant(supported: DeviceFormat) -> Self {
        Self::build(supported, true)
    }

    fn build(supported: DeviceFormat, instant_playout: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                supported,
                buffer_size: 0,
                held: 0.0,
                last_drain: Instant::now(),
                suspended: false,
                instant_playout,
                volume: 1.0,
                fail_writes: false,
            })),
        }
    }

    fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }
}

fn drain(state: &mut DeviceState) {
    let elapsed_ms = state.last_drain.elapsed().as_secs_f64() * 1000.0;
    state.last_drain = Instant::now();
    if state.instant_playout {
        state.held = 0.0;
    } else if !state.suspended {
        state.held = (state.held - elapsed_ms * state.supported.bytes_per_ms()).max(0.0);
    }
}

impl AudioDevice for MockDevice {
    fn init(&mut self, _requested: DeviceFormat) -> Result<DeviceFormat> {
        Ok(self.state.lock().unwrap().supported)
    }

    fn set_buffer_size(&mut self, bytes: usize) {
        self.state.lock().unwrap().buffer_size = bytes;
    }

    fn buffer_size(&self) -> usize {
        self.state.lock().unwrap().buffer_size
    }

    fn bytes_free(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        drain(&mut state);
        state.buffer_size - state.held as usize
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(Error::device("underrun"));
        }
        drain(&mut state);
        let space = state.buffer_size - state.held as usize;
        let accepted = data.len().min(space);
        state.held += accepted as f64;
        Ok(accepted)
    }

    fn suspend(&mut self) {
        let mut state = self.state.lock().unwrap();
        drain(&mut state);
        state.suspended = true;
    }

    fn resume(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.last_drain = Instant::now();
        state.suspended = false;
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.held = 0.0;
        state.suspended = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().unwrap().volume = volume;
    }
}

/// Renderer double collecting emitted frames.
struct CollectingRenderer {
    frames: Mutex<Vec<(u32, u32, i64)>>,
    states: Mutex<Vec<RenderState>>,
}

impl CollectingRenderer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
        })
    }

    fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl VideoOutput for CollectingRenderer {
    fn surface_size(&self) -> Option<(u32, u32)> {
        Some((1280, 720))
    }

    fn frame_ready(&self, frame: VideoFrame) {
        self.frames
            .lock()
            .unwrap()
            .push((frame.width, frame.height, frame.pts_ms));
    }

    fn state_changed(&self, state: RenderState) {
        self.states.lock().unwrap().push(state);
    }
}

const CD_STEREO: DeviceFormat = DeviceFormat {
    sample_rate: 44_100,
    channels: 2,
    sample_bits: 16,
};

fn wait_for_state(
    events: &Receiver<PipelineEvent>,
    wanted: PipelineState,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(remaining) {
            Ok(PipelineEvent::StateChanged { state, .. }) if state == wanted => return true,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    false
}

// ─── scenarios ──────────────────────────────────────────────────────────

#[test]
fn happy_path_25fps() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let renderer = CollectingRenderer::new();
    let renderer_dyn: Arc<dyn VideoOutput> = renderer.clone();
    pipeline.set_video_output(&renderer_dyn);
    let events = pipeline.events();

    let seen_target = Arc::new(Mutex::new(None));
    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(1000, true, true)),
            audio_decoder: Some(audio_factory(Arc::clone(&seen_target))),
            video_decoder: Some(video_factory()),
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();

    assert!(pipeline.is_playing());

    // the audio clock must be monotonic while we wait for the end
    let mut last_clock = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Ended {
        assert!(Instant::now() < deadline, "pipeline never ended");
        let clock = pipeline.get_audio_clock();
        assert!(clock >= last_clock, "audio clock went backwards");
        last_clock = clock;
        std::thread::sleep(Duration::from_millis(20));
    }

    // every emitted frame is RGBA 1280x720
    let frames = renderer.frames.lock().unwrap().clone();
    assert!(
        frames.len() >= 15,
        "too few frames emitted: {}",
        frames.len()
    );
    assert!(frames.iter().all(|&(w, h, _)| (w, h) == (1280, 720)));

    // all 25 candidates went through the pacer (zero overflow upstream)
    assert_eq!(pipeline.get_video_clock(), 24 * 40);

    // the clock tracked the one second of audio
    let clock = pipeline.get_audio_clock();
    assert!(
        (600..=1300).contains(&clock),
        "audio clock way off: {clock}"
    );

    // the decoder was targeted at the adopted device format
    assert_eq!(
        seen_target.lock().unwrap().unwrap().sample_rate,
        44_100
    );

    assert!(wait_for_state(
        &events,
        PipelineState::Ended,
        Duration::from_secs(1)
    ));
    pipeline.stop();
}

#[test]
fn audio_faster_forces_video_drops() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let renderer = CollectingRenderer::new();
    let renderer_dyn: Arc<dyn VideoOutput> = renderer.clone();
    pipeline.set_video_output(&renderer_dyn);

    // instant playout races the master clock far ahead of the video
    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(1000, true, true)),
            audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
            video_decoder: Some(video_factory()),
            audio_device: Some(Box::new(MockDevice::instant(CD_STEREO))),
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Ended {
        assert!(Instant::now() < deadline, "pipeline never ended");
        std::thread::sleep(Duration::from_millis(10));
    }

    // frame numbers advanced through every candidate, but some frames
    // were dropped rather than emitted
    assert_eq!(pipeline.get_video_clock(), 24 * 40);
    assert!(
        renderer.frame_count() < 25,
        "no frames were dropped despite audio running ahead"
    );

    pipeline.stop();
}

#[test]
fn device_nearest_format_retargets_decoder() {
    let pipeline = Pipeline::new(PipelineConfig::default());

    // source says 48 kHz, the device only does 44.1 kHz
    let demuxer = MockDemuxer {
        info: StreamInfo {
            video: None,
            audio: Some(audio_info(48_000)),
        },
        packets: Mutex::new(
            (0..10)
                .map(|n| {
                    Ok(Some(Packet::new(
                        vec![1],
                        Some(Pts(n * 20)),
                        Rational::MILLIS,
                        true,
                        StreamType::Audio,
                    )))
                })
                .collect(),
        ),
        paced: false,
        started: None,
    };

    let seen_target = Arc::new(Mutex::new(None));
    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(demuxer),
            audio_decoder: Some(audio_factory(Arc::clone(&seen_target))),
            video_decoder: None,
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Ended {
        assert!(Instant::now() < deadline, "pipeline never ended");
        std::thread::sleep(Duration::from_millis(10));
    }

    // the decoder produced frames at the adopted rate, not the source's
    let target = seen_target.lock().unwrap().unwrap();
    assert_eq!(target.sample_rate, 44_100);
    assert_eq!(target.channels, 2);

    pipeline.stop();
}

#[test]
fn eof_drains_and_trailing_stop_is_noop() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let events = pipeline.events();

    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(400, true, true)),
            audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
            video_decoder: Some(video_factory()),
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();

    assert!(wait_for_state(
        &events,
        PipelineState::Ended,
        Duration::from_secs(5)
    ));

    // drain whatever is left, then stop: no further events may appear
    while events.try_recv().is_ok() {}
    pipeline.stop();
    std::thread::sleep(Duration::from_millis(50));
    assert!(
        events.try_recv().is_err(),
        "stop after a natural end emitted events"
    );

    // the controller accepts a fresh start afterward
    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(paced_av_demuxer(400, false, true)),
            audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
            video_decoder: None,
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();
    assert!(pipeline.is_playing());
    pipeline.stop();
    assert!(!pipeline.is_playing());
}

#[test]
fn audio_only_stream_runs_without_video() {
    let pipeline = Pipeline::new(PipelineConfig::default());

    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(400, false, true)),
            audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
            video_decoder: None,
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Ended {
        assert!(Instant::now() < deadline, "pipeline never ended");
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(pipeline.get_video_clock(), 0);
    assert!(pipeline.get_audio_clock() > 0);
    pipeline.stop();
}

#[test]
fn video_only_stream_paces_on_wall_clock() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let renderer = CollectingRenderer::new();
    let renderer_dyn: Arc<dyn VideoOutput> = renderer.clone();
    pipeline.set_video_output(&renderer_dyn);

    let started = Instant::now();
    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(600, true, false)),
            audio_decoder: None,
            video_decoder: Some(video_factory()),
            audio_device: None,
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Ended {
        assert!(Instant::now() < deadline, "pipeline never ended");
        // no audio anywhere: the master clock must stay at zero
        assert_eq!(pipeline.get_audio_clock(), 0);
        std::thread::sleep(Duration::from_millis(10));
    }

    // 15 frames at 25 fps paced by wall clock: not all at once
    assert_eq!(renderer.frame_count(), 15);
    assert!(
        started.elapsed() >= Duration::from_millis(400),
        "video-only pacing did not follow the wall clock"
    );
    pipeline.stop();
}

#[test]
fn pause_freezes_the_master_clock() {
    let pipeline = Pipeline::new(PipelineConfig::default());

    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(paced_av_demuxer(5000, false, true)),
            audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
            video_decoder: None,
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(200));
    pipeline.pause();
    assert_eq!(pipeline.state(), PipelineState::Paused);

    std::thread::sleep(Duration::from_millis(50));
    let frozen = pipeline.get_audio_clock();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(
        pipeline.get_audio_clock(),
        frozen,
        "master clock advanced while paused"
    );

    pipeline.resume();
    assert_eq!(pipeline.state(), PipelineState::Playing);

    let resumed_at = pipeline.get_audio_clock();
    std::thread::sleep(Duration::from_millis(300));
    assert!(
        pipeline.get_audio_clock() > resumed_at,
        "master clock did not advance after resume"
    );

    pipeline.stop();
}

#[test]
fn device_failure_surfaces_and_stops() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let events = pipeline.events();

    let device = MockDevice::realtime(CD_STEREO);
    let handle = device.clone();

    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(2000, false, true)),
            audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
            video_decoder: None,
            audio_device: Some(Box::new(device)),
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(100));
    handle.fail_writes();

    assert!(wait_for_state(
        &events,
        PipelineState::Error,
        Duration::from_secs(5)
    ));

    // a fatal leaves nothing partially running
    pipeline.stop();
    assert_eq!(pipeline.state(), PipelineState::Error);
}

#[test]
fn decoder_init_failure_is_fatal() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let events = pipeline.events();

    let failing: AudioDecodeFactory =
        Box::new(|_| Err(Error::codec("unsupported audio codec")));

    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(400, false, true)),
            audio_decoder: Some(failing),
            video_decoder: None,
            audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
        })
        .unwrap();

    assert!(wait_for_state(
        &events,
        PipelineState::Error,
        Duration::from_secs(5)
    ));
    pipeline.stop();
}

#[test]
fn no_streams_is_a_configuration_error() {
    let pipeline = Pipeline::new(PipelineConfig::default());

    let result = pipeline.start_with_parts(PipelineParts {
        demuxer: Box::new(MockDemuxer {
            info: StreamInfo::default(),
            packets: Mutex::new(VecDeque::new()),
            paced: false,
            started: None,
        }),
        audio_decoder: None,
        video_decoder: None,
        audio_device: None,
    });

    assert!(result.is_err());
    assert_eq!(pipeline.state(), PipelineState::Error);
    assert!(!pipeline.is_playing());
}

#[test]
fn restart_after_stop_succeeds() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let renderer = CollectingRenderer::new();
    let renderer_dyn: Arc<dyn VideoOutput> = renderer.clone();
    pipeline.set_video_output(&renderer_dyn);

    for _ in 0..2 {
        pipeline
            .start_with_parts(PipelineParts {
                demuxer: Box::new(av_demuxer(200, true, true)),
                audio_decoder: Some(audio_factory(Arc::new(Mutex::new(None)))),
                video_decoder: Some(video_factory()),
                audio_device: Some(Box::new(MockDevice::realtime(CD_STEREO))),
            })
            .unwrap();
        assert!(pipeline.is_playing());
        std::thread::sleep(Duration::from_millis(100));
        pipeline.stop();
        assert!(!pipeline.is_playing());
        assert_eq!(pipeline.get_audio_clock(), 0);
        assert_eq!(pipeline.get_video_clock(), 0);
    }
}

#[test]
fn video_clock_tracks_the_frame_counter() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let renderer = CollectingRenderer::new();
    let renderer_dyn: Arc<dyn VideoOutput> = renderer.clone();
    pipeline.set_video_output(&renderer_dyn);

    pipeline
        .start_with_parts(PipelineParts {
            demuxer: Box::new(av_demuxer(400, true, false)),
            audio_decoder: None,
            video_decoder: Some(video_factory()),
            audio_device: None,
        })
        .unwrap();

    let observed = Arc::new(AtomicI64::new(0));
    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Ended {
        assert!(Instant::now() < deadline, "pipeline never ended");
        let clock = pipeline.get_video_clock();
        assert!(clock >= observed.load(Ordering::Relaxed));
        observed.store(clock, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(pipeline.get_video_clock(), 9 * 40);
    pipeline.stop();
}
