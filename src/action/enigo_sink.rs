use std::collections::HashSet;
use std::time::Duration;

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use super::{tween_steps, ActionSink, MouseButton, SinkError, SinkResult, TWEEN_STEP};

/// OS input injection via `enigo`. Create one per controller thread.
pub struct EnigoSink {
    enigo: Enigo,
    held: HashSet<char>,
}

impl EnigoSink {
    pub fn new() -> SinkResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(Self {
            enigo,
            held: HashSet::new(),
        })
    }

    fn key(&mut self, key: char, direction: Direction) -> SinkResult<()> {
        if key.is_control() {
            return Err(SinkError::InvalidKey(key));
        }
        self.enigo
            .key(Key::Unicode(key), direction)
            .map_err(|e| SinkError::InjectionFailed(e.to_string()))
    }
}

impl ActionSink for EnigoSink {
    fn name(&self) -> &'static str {
        "enigo"
    }

    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> SinkResult<()> {
        let steps = tween_steps(dx, dy, duration);
        if steps.is_empty() {
            std::thread::sleep(duration);
            return Ok(());
        }
        for (sx, sy) in steps {
            self.enigo
                .move_mouse(sx, sy, Coordinate::Rel)
                .map_err(|e| SinkError::InjectionFailed(e.to_string()))?;
            std::thread::sleep(TWEEN_STEP);
        }
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> SinkResult<()> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        };
        self.enigo
            .button(button, Direction::Click)
            .map_err(|e| SinkError::InjectionFailed(e.to_string()))
    }

    fn key_down(&mut self, key: char) -> SinkResult<()> {
        self.key(key, Direction::Press)?;
        self.held.insert(key);
        Ok(())
    }

    fn key_up(&mut self, key: char) -> SinkResult<()> {
        // Release is only forwarded for keys this sink pressed, so repeated
        // releases never reach the OS.
        if !self.held.remove(&key) {
            return Ok(());
        }
        self.key(key, Direction::Release)
    }
}

impl Drop for EnigoSink {
    fn drop(&mut self) {
        let held: Vec<char> = self.held.drain().collect();
        for key in held {
            let _ = self.key(key, Direction::Release);
        }
    }
}
