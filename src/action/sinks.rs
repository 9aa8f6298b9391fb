use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ActionCommand, ActionSink, MouseButton, SinkError, SinkResult};

/// Dry-run sink: logs every command instead of injecting it. Moves still
/// take their full duration so the controller cadence matches a real run.
#[derive(Debug, Default)]
pub struct LogSink {
    channel: &'static str,
    held: HashSet<char>,
}

impl LogSink {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            held: HashSet::new(),
        }
    }
}

impl ActionSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> SinkResult<()> {
        if dx != 0 || dy != 0 {
            log::info!("[{}] move ({}, {}) over {:?}", self.channel, dx, dy, duration);
        } else {
            log::trace!("[{}] idle move", self.channel);
        }
        std::thread::sleep(duration);
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> SinkResult<()> {
        log::info!("[{}] click {:?}", self.channel, button);
        Ok(())
    }

    fn key_down(&mut self, key: char) -> SinkResult<()> {
        self.held.insert(key);
        log::info!("[{}] key down {:?}", self.channel, key);
        Ok(())
    }

    fn key_up(&mut self, key: char) -> SinkResult<()> {
        if self.held.remove(&key) {
            log::info!("[{}] key up {:?}", self.channel, key);
        } else {
            log::trace!("[{}] key up {:?} (not held)", self.channel, key);
        }
        Ok(())
    }
}

/// Sink that records commands into a shared log, for tests and the demo.
///
/// Clones share the same log. Moves are recorded without sleeping.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<ActionCommand>>>,
    fail_on: Option<ActionKind>,
}

/// Command kinds a `RecordingSink` can be told to reject.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Move,
    Click,
    KeyDown,
    KeyUp,
}

impl ActionKind {
    fn of(command: &ActionCommand) -> Self {
        match command {
            ActionCommand::Move { .. } => ActionKind::Move,
            ActionCommand::Click { .. } => ActionKind::Click,
            ActionCommand::KeyDown { .. } => ActionKind::KeyDown,
            ActionCommand::KeyUp { .. } => ActionKind::KeyUp,
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command of `kind` fail with `InjectionFailed`.
    pub fn failing_on(mut self, kind: ActionKind) -> Self {
        self.fail_on = Some(kind);
        self
    }

    /// Copy of everything recorded so far.
    pub fn commands(&self) -> Vec<ActionCommand> {
        self.log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn record(&mut self, command: ActionCommand) -> SinkResult<()> {
        if self.fail_on == Some(ActionKind::of(&command)) {
            return Err(SinkError::InjectionFailed(format!("{:?} rejected", command)));
        }
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command);
        Ok(())
    }
}

impl ActionSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> SinkResult<()> {
        self.record(ActionCommand::Move { dx, dy, duration })
    }

    fn click(&mut self, button: MouseButton) -> SinkResult<()> {
        self.record(ActionCommand::Click { button })
    }

    fn key_down(&mut self, key: char) -> SinkResult<()> {
        self.record(ActionCommand::KeyDown { key })
    }

    fn key_up(&mut self, key: char) -> SinkResult<()> {
        self.record(ActionCommand::KeyUp { key })
    }
}
