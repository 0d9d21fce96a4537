/*!
    Video decode stage: queue drain, decode, pace against the master
    clock, emit.
*/

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use media_types::{MasterClock, Result, VideoDecode, VideoFrame};

use crate::queue::PacketQueue;
use crate::stage::{PAUSE_POLL, QUEUE_WAIT};

/// Video may run ahead of audio by one 25 fps frame before we hold it.
const AHEAD_THRESHOLD_MS: i64 = 40;
/// Behind this, catching up by playing faster looks worse than a drop.
const BEHIND_THRESHOLD_MS: i64 = -100;
/// Cap on any single pacing wait.
const MAX_WAIT_MS: i64 = 200;

/**
    Builds the decoder on the stage thread.
*/
pub type VideoDecodeFactory = Box<dyn FnOnce() -> Result<Box<dyn VideoDecode>> + Send>;

/**
    Stage outputs, wired by the controller.
*/
pub struct VideoStageHooks {
    /// A paced RGBA frame; ownership transfers to the renderer.
    pub on_frame: Box<dyn Fn(VideoFrame) + Send>,
    /// Persistent failure; the stage has terminated.
    pub on_error: Box<dyn Fn(String) + Send>,
    /// The stage drained its end-of-stream sentinel or was stopped.
    pub on_finished: Box<dyn Fn() + Send>,
}

/**
    Pacing decision for one candidate frame.
*/
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PaceAction {
    /// Ahead of the audio clock: burn half the lead, then emit.
    SleepThenEmit(Duration),
    /// Too far behind: skip this frame entirely.
    Drop,
    /// Roughly in sync: hold to the wall-clock schedule, then emit.
    WaitThenEmit(Duration),
    /// Emit immediately.
    Emit,
}

/**
    Decide how to pace a candidate frame.

    `video_ms` is the frame's position on the video timeline
    (`frame_number * 1000 / frame_rate`), `audio_clock_ms` the master
    clock (0 means "no audio yet"), `wall_elapsed_ms` the time since
    playback started.
*/
pub(crate) fn pace_frame(video_ms: i64, audio_clock_ms: i64, wall_elapsed_ms: i64) -> PaceAction {
    if audio_clock_ms > 0 {
        let drift = video_ms - audio_clock_ms;
        if drift > AHEAD_THRESHOLD_MS {
            let sleep = (drift / 2).min(100);
            return PaceAction::SleepThenEmit(Duration::from_millis(sleep as u64));
        }
        if drift < BEHIND_THRESHOLD_MS {
            return PaceAction::Drop;
        }
    }

    let wait = video_ms - wall_elapsed_ms;
    if wait > 0 && wait < MAX_WAIT_MS {
        return PaceAction::WaitThenEmit(Duration::from_millis(wait as u64));
    }

    PaceAction::Emit
}

/**
    Spawn the video decode loop.

    Decoded frames are paced against the master clock per `pace_frame`;
    with a zero frame rate pacing is disabled and frames emit as fast as
    they decode. The frame counter advances for drops as well as
    emissions. On the end-of-stream sentinel the decoder is flushed and
    the loop exits.
*/
pub fn spawn_video_stage(
    factory: VideoDecodeFactory,
    frame_rate: f64,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    clock: Arc<MasterClock>,
    video_clock_ms: Arc<AtomicI64>,
    hooks: VideoStageHooks,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut decoder = match factory() {
            Ok(decoder) => decoder,
            Err(e) => {
                (hooks.on_error)(format!("video decoder init failed: {e}"));
                return;
            }
        };

        let mut pacer = Pacer {
            frame_rate,
            frame_number: 0,
            started: Instant::now(),
            clock,
            video_clock_ms,
            running: Arc::clone(&running),
        };

        'main: while running.load(Ordering::Acquire) {
            if paused.load(Ordering::Acquire) {
                let pause_began = Instant::now();
                while paused.load(Ordering::Acquire) && running.load(Ordering::Acquire) {
                    thread::sleep(PAUSE_POLL);
                }
                // keep the wall-clock schedule aligned across the gap
                pacer.started += pause_began.elapsed();
                continue;
            }

            let Some(packet) = queue.pop(QUEUE_WAIT) else {
                continue;
            };

            if packet.is_eos() {
                match decoder.flush() {
                    Ok(frames) => {
                        for frame in frames {
                            pacer.pace_and_emit(frame, &hooks);
                        }
                    }
                    Err(e) => warn!("video decoder flush failed: {e}"),
                }
                break;
            }

            if queue.in_drop_mode() && !packet.is_keyframe {
                debug!("drop mode: discarding non-key video packet");
                continue;
            }

            match decoder.decode(&packet) {
                Ok(frames) => {
                    for frame in frames {
                        if !running.load(Ordering::Acquire) {
                            break 'main;
                        }
                        pacer.pace_and_emit(frame, &hooks);
                    }
                }
                Err(e) => {
                    (hooks.on_error)(format!("video decode failed: {e}"));
                    return;
                }
            }
        }

        (hooks.on_finished)();
        info!("video decoding stopped");
    })
}

struct Pacer {
    frame_rate: f64,
    frame_number: u64,
    started: Instant,
    clock: Arc<MasterClock>,
    video_clock_ms: Arc<AtomicI64>,
    running: Arc<AtomicBool>,
}

impl Pacer {
    fn pace_and_emit(&mut self, frame: VideoFrame, hooks: &VideoStageHooks) {
        if self.frame_rate <= 0.0 {
            // free-running: no pacing reference at all
            self.video_clock_ms.store(frame.pts_ms, Ordering::Release);
            self.frame_number += 1;
            (hooks.on_frame)(frame);
            return;
        }

        let video_ms = (self.frame_number as f64 * 1000.0 / self.frame_rate) as i64;
        self.video_clock_ms.store(video_ms, Ordering::Release);
        self.frame_number += 1;

        let audio_clock_ms = self.clock.millis();
        let wall_elapsed_ms = self.started.elapsed().as_millis() as i64;

        match pace_frame(video_ms, audio_clock_ms, wall_elapsed_ms) {
            PaceAction::SleepThenEmit(sleep) => {
                self.interruptible_sleep(sleep);
                (hooks.on_frame)(frame);
            }
            PaceAction::Drop => {
                debug!(
                    video_ms,
                    audio_clock_ms, "video behind audio, dropping frame"
                );
            }
            PaceAction::WaitThenEmit(wait) => {
                self.interruptible_sleep(wait);
                (hooks.on_frame)(frame);
            }
            PaceAction::Emit => (hooks.on_frame)(frame),
        }
    }

    /// Sleep in small slices so stop() is never held up by a pacing wait.
    fn interruptible_sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(20)));
        }
    }
}
