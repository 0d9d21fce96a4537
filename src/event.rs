/*!
    Pipeline states and events surfaced to the embedder.
*/

use media_types::StreamInfo;

/**
    Lifecycle state of the pipeline, owned by the controller.

    Transitions are totally ordered as observed through the event channel.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing running.
    Idle,
    /// Session opening and decoders spinning up.
    Opening,
    /// All stages running.
    Playing,
    /// Device suspended, decode stages holding.
    Paused,
    /// Teardown in progress.
    Stopping,
    /// Stream ran to completion.
    Ended,
    /// A fatal error stopped the session.
    Error,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Ended => "ended",
            Self::Error => "error",
        }
    }
}

/**
    Events emitted by the pipeline controller.

    Delivered in send order over a single channel; the embedder owns the
    receiving end.
*/
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// All stages started; playback is live.
    PlaybackStarted,
    /// The session was stopped and torn down.
    PlaybackStopped,
    /// A state transition, with the component that triggered it.
    StateChanged {
        state: PipelineState,
        source: &'static str,
    },
    /// A fatal error, already logged, surfaced for the user.
    ErrorOccurred(String),
    /// Stream layout probed after open.
    StreamInfoReady(StreamInfo),
}
