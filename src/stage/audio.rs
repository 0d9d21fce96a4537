/*!
    Audio decode stage: queue drain, decode, resample, emit.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use media_types::{AudioDecode, AudioFrame, Result, TargetAudioFormat};

use crate::queue::PacketQueue;
use crate::stage::{PAUSE_POLL, QUEUE_WAIT};

/// How often the decode heartbeat logs queue depth.
const HEARTBEAT: std::time::Duration = std::time::Duration::from_secs(1);

/**
    Builds the decoder on the stage thread, targeted at the sink's
    adopted format.
*/
pub type AudioDecodeFactory =
    Box<dyn FnOnce(TargetAudioFormat) -> Result<Box<dyn AudioDecode>> + Send>;

/**
    Stage outputs, wired by the controller.
*/
pub struct AudioStageHooks {
    /// A decoded frame ready for the sink.
    pub on_frame: Box<dyn Fn(Arc<AudioFrame>) + Send>,
    /// Millisecond PTS of the frame about to be emitted (informational;
    /// the sink's byte clock is authoritative).
    pub on_clock: Box<dyn Fn(i64) + Send>,
    /// Persistent failure; the stage has terminated.
    pub on_error: Box<dyn Fn(String) + Send>,
    /// The stage drained its end-of-stream sentinel or was stopped.
    pub on_finished: Box<dyn Fn() + Send>,
}

/**
    Spawn the audio decode loop.

    Runs while `running` is set; once the end-of-stream sentinel is
    dequeued the decoder is flushed and the loop exits. While the queue is
    in drop mode, non-key packets are discarded without decoding.
*/
pub fn spawn_audio_stage(
    factory: AudioDecodeFactory,
    target: TargetAudioFormat,
    queue: Arc<PacketQueue>,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    hooks: AudioStageHooks,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut decoder = match factory(target) {
            Ok(decoder) => decoder,
            Err(e) => {
                (hooks.on_error)(format!("audio decoder init failed: {e}"));
                return;
            }
        };

        let mut heartbeat = Instant::now();

        while running.load(Ordering::Acquire) {
            if paused.load(Ordering::Acquire) {
                thread::sleep(PAUSE_POLL);
                continue;
            }

            let Some(packet) = queue.pop(QUEUE_WAIT) else {
                continue;
            };

            if packet.is_eos() {
                match decoder.flush() {
                    Ok(frames) => emit_frames(frames, &hooks),
                    Err(e) => warn!("audio decoder flush failed: {e}"),
                }
                break;
            }

            if queue.in_drop_mode() && !packet.is_keyframe {
                debug!("drop mode: discarding non-key audio packet");
                continue;
            }

            match decoder.decode(&packet) {
                Ok(frames) => emit_frames(frames, &hooks),
                Err(e) => {
                    (hooks.on_error)(format!("audio decode failed: {e}"));
                    return;
                }
            }

            if heartbeat.elapsed() >= HEARTBEAT {
                debug!(queue_depth = queue.len(), "audio decode heartbeat");
                heartbeat = Instant::now();
            }
        }

        (hooks.on_finished)();
        info!("audio decoding stopped");
    })
}

fn emit_frames(frames: Vec<AudioFrame>, hooks: &AudioStageHooks) {
    for frame in frames {
        (hooks.on_clock)(frame.pts_ms);
        (hooks.on_frame)(Arc::new(frame));
    }
}
