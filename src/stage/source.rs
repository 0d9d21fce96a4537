/*!
    Packet source stage: the network read loop.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use media_types::{Demuxer, Packet, StreamType};

use crate::queue::PacketQueue;

/// Read failures tolerated in a row before the session is declared dead.
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/**
    Spawn the read loop: pull packets from the demuxer, fan them out to
    the per-stream queues, and terminate each queue with exactly one
    end-of-stream sentinel when the loop exits (EOF or stop).

    The loop never blocks on the queues; its only backpressure is the
    network read rate itself.
*/
pub fn spawn_source_stage(
    mut demuxer: Box<dyn Demuxer>,
    audio_queue: Option<Arc<PacketQueue>>,
    video_queue: Option<Arc<PacketQueue>>,
    running: Arc<AtomicBool>,
    on_error: Box<dyn Fn(String) + Send>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut consecutive_errors = 0u32;

        while running.load(Ordering::Acquire) {
            match demuxer.read_packet() {
                Ok(Some(packet)) => {
                    consecutive_errors = 0;
                    match packet.stream_type {
                        StreamType::Audio => {
                            if let Some(queue) = &audio_queue {
                                queue.push(packet);
                            }
                        }
                        StreamType::Video => {
                            if let Some(queue) = &video_queue {
                                queue.push(packet);
                            }
                        }
                    }
                }
                Ok(None) => {
                    info!("end of stream reached");
                    break;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    debug!(error = %e, consecutive_errors, "packet read failed");
                    if consecutive_errors > MAX_CONSECUTIVE_ERRORS {
                        on_error("too many consecutive read errors".to_string());
                        break;
                    }
                }
            }
        }

        if let Some(queue) = &audio_queue {
            queue.push(Packet::end_of_stream(StreamType::Audio));
        }
        if let Some(queue) = &video_queue {
            queue.push(Packet::end_of_stream(StreamType::Video));
        }

        info!("stream pull stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use media_types::{Error, Rational, Result, StreamInfo};

    /// Demuxer scripted from a list of read results.
    struct ScriptedDemuxer {
        info: StreamInfo,
        script: Mutex<Vec<Result<Option<Packet>>>>,
    }

    impl ScriptedDemuxer {
        fn new(script: Vec<Result<Option<Packet>>>) -> Self {
            let mut script = script;
            script.reverse();
            Self {
                info: StreamInfo::default(),
                script: Mutex::new(script),
            }
        }
    }

    impl Demuxer for ScriptedDemuxer {
        fn stream_info(&self) -> &StreamInfo {
            &self.info
        }

        fn read_packet(&mut self) -> Result<Option<Packet>> {
            self.script.lock().unwrap().pop().unwrap_or(Ok(None))
        }
    }

    fn audio_packet(n: u8) -> Packet {
        Packet::new(vec![n], None, Rational::MILLIS, true, StreamType::Audio)
    }

    fn video_packet(n: u8) -> Packet {
        Packet::new(vec![n], None, Rational::MILLIS, true, StreamType::Video)
    }

    #[test]
    fn classifies_packets_and_appends_sentinels() {
        let demuxer = ScriptedDemuxer::new(vec![
            Ok(Some(audio_packet(1))),
            Ok(Some(video_packet(2))),
            Ok(Some(audio_packet(3))),
            Ok(None),
        ]);

        let audio = Arc::new(PacketQueue::new(10));
        let video = Arc::new(PacketQueue::new(10));
        let running = Arc::new(AtomicBool::new(true));

        let handle = spawn_source_stage(
            Box::new(demuxer),
            Some(Arc::clone(&audio)),
            Some(Arc::clone(&video)),
            running,
            Box::new(|_| panic!("unexpected source error")),
        );
        handle.join().unwrap();

        assert_eq!(audio.len(), 3); // 2 data + 1 sentinel
        assert_eq!(video.len(), 2); // 1 data + 1 sentinel

        let mut last = None;
        while let Some(packet) = audio.pop(std::time::Duration::ZERO) {
            last = Some(packet);
        }
        assert!(last.unwrap().is_eos());
    }

    #[test]
    fn error_counter_resets_on_success() {
        let mut script = Vec::new();
        // interleave failures below the threshold with successes
        for n in 0..4 {
            for _ in 0..40 {
                script.push(Err(Error::network("flaky link")));
            }
            script.push(Ok(Some(audio_packet(n))));
        }
        script.push(Ok(None));

        let demuxer = ScriptedDemuxer::new(script);
        let audio = Arc::new(PacketQueue::new(10));
        let running = Arc::new(AtomicBool::new(true));
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let errors_in = Arc::clone(&errors);

        let handle = spawn_source_stage(
            Box::new(demuxer),
            Some(Arc::clone(&audio)),
            None,
            running,
            Box::new(move |e| errors_in.lock().unwrap().push(e)),
        );
        handle.join().unwrap();

        assert!(errors.lock().unwrap().is_empty());
        assert_eq!(audio.len(), 5); // 4 data + sentinel
    }

    #[test]
    fn read_error_storm_fails_the_session() {
        let script = (0..60)
            .map(|_| Err(Error::network("link down")))
            .collect::<Vec<_>>();

        let demuxer = ScriptedDemuxer::new(script);
        let audio = Arc::new(PacketQueue::new(10));
        let running = Arc::new(AtomicBool::new(true));
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let errors_in = Arc::clone(&errors);

        let handle = spawn_source_stage(
            Box::new(demuxer),
            Some(Arc::clone(&audio)),
            None,
            running,
            Box::new(move |e| errors_in.lock().unwrap().push(e)),
        );
        handle.join().unwrap();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("consecutive read errors"));

        // the sentinel is still delivered so decoders drain cleanly
        let mut last = None;
        while let Some(packet) = audio.pop(std::time::Duration::ZERO) {
            last = Some(packet);
        }
        assert!(last.unwrap().is_eos());
    }

    #[test]
    fn stop_flag_ends_the_loop_with_sentinels() {
        struct Endless;
        impl Demuxer for Endless {
            fn stream_info(&self) -> &StreamInfo {
                static INFO: StreamInfo = StreamInfo {
                    video: None,
                    audio: None,
                };
                &INFO
            }
            fn read_packet(&mut self) -> Result<Option<Packet>> {
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(Some(Packet::new(
                    vec![0],
                    None,
                    Rational::MILLIS,
                    false,
                    StreamType::Video,
                )))
            }
        }

        let video = Arc::new(PacketQueue::new(10));
        let running = Arc::new(AtomicBool::new(true));

        let handle = spawn_source_stage(
            Box::new(Endless),
            None,
            Some(Arc::clone(&video)),
            Arc::clone(&running),
            Box::new(|_| {}),
        );

        std::thread::sleep(std::time::Duration::from_millis(20));
        running.store(false, Ordering::Release);
        handle.join().unwrap();

        let mut saw_eos = false;
        while let Some(packet) = video.pop(std::time::Duration::ZERO) {
            saw_eos = packet.is_eos();
        }
        assert!(saw_eos);
    }
}
