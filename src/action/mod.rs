//! Action sinks: the input-injection boundary.
//!
//! Both controllers talk to an `ActionSink`. Each controller owns its own
//! sink and its own input channel (pointer vs keyboard), so sinks are not
//! shared and no lock is taken around injection.

mod sinks;

#[cfg(feature = "input-enigo")]
mod enigo_sink;

use std::time::Duration;

use thiserror::Error;

pub use sinks::{ActionKind, LogSink, RecordingSink};

#[cfg(feature = "input-enigo")]
pub use enigo_sink::EnigoSink;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// One transient instruction sent to a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionCommand {
    Move { dx: i32, dy: i32, duration: Duration },
    Click { button: MouseButton },
    KeyDown { key: char },
    KeyUp { key: char },
}

impl ActionCommand {
    /// Zero-magnitude move used as the aim controller's idle pulse.
    pub fn is_idle_move(&self) -> bool {
        matches!(self, ActionCommand::Move { dx: 0, dy: 0, .. })
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("input backend unavailable: {0}")]
    Unavailable(String),
    #[error("injection failed: {0}")]
    InjectionFailed(String),
    #[error("invalid key: {0:?}")]
    InvalidKey(char),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Fire-and-forget input injection targeting the focused window.
pub trait ActionSink {
    fn name(&self) -> &'static str;

    /// Relative pointer move spread over `duration`.
    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> SinkResult<()>;

    fn click(&mut self, button: MouseButton) -> SinkResult<()>;

    fn key_down(&mut self, key: char) -> SinkResult<()>;

    /// Releasing a key that is not held must succeed.
    fn key_up(&mut self, key: char) -> SinkResult<()>;

    fn execute(&mut self, command: ActionCommand) -> SinkResult<()> {
        match command {
            ActionCommand::Move { dx, dy, duration } => self.move_relative(dx, dy, duration),
            ActionCommand::Click { button } => self.click(button),
            ActionCommand::KeyDown { key } => self.key_down(key),
            ActionCommand::KeyUp { key } => self.key_up(key),
        }
    }
}

impl<S: ActionSink + ?Sized> ActionSink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> SinkResult<()> {
        (**self).move_relative(dx, dy, duration)
    }

    fn click(&mut self, button: MouseButton) -> SinkResult<()> {
        (**self).click(button)
    }

    fn key_down(&mut self, key: char) -> SinkResult<()> {
        (**self).key_down(key)
    }

    fn key_up(&mut self, key: char) -> SinkResult<()> {
        (**self).key_up(key)
    }
}

/// Interval between intermediate pointer steps of a smoothed move.
pub const TWEEN_STEP: Duration = Duration::from_millis(10);

/// Split a relative move into integer steps, one per `TWEEN_STEP` of
/// `duration`. Steps sum exactly to `(dx, dy)`. A zero move yields no steps.
pub fn tween_steps(dx: i32, dy: i32, duration: Duration) -> Vec<(i32, i32)> {
    if dx == 0 && dy == 0 {
        return Vec::new();
    }
    let count = (duration.as_millis() / TWEEN_STEP.as_millis()).max(1) as i64;
    let (dx, dy) = (dx as i64, dy as i64);
    (1..=count)
        .map(|i| {
            let x = dx * i / count - dx * (i - 1) / count;
            let y = dy * i / count - dy * (i - 1) / count;
            (x as i32, y as i32)
        })
        .collect()
}
