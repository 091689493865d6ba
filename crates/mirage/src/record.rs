//! Optional statement recording.

use std::sync::Mutex;

/// An append-only log of executed statement texts, captured between
/// `start` and `stop`.
#[derive(Default)]
pub struct Recorder {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    enabled: bool,
    log: Vec<String>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the log and starts capturing.
    pub fn start(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.log.clear();
            state.enabled = true;
        }
    }

    /// Stops capturing; the log stays readable.
    pub fn stop(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.enabled = false;
        }
    }

    /// Appends one statement text when capture is on.
    pub fn append(&self, text: &str) {
        if let Ok(mut state) = self.inner.lock() {
            if state.enabled {
                state.log.push(text.to_string());
            }
        }
    }

    /// A copy of the captured log.
    pub fn recorded(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn captures_only_between_start_and_stop() {
        let recorder = Recorder::new();
        recorder.append("before");
        recorder.start();
        recorder.append("one");
        recorder.append("two");
        recorder.stop();
        recorder.append("after");
        assert_eq!(recorder.recorded(), vec!["one", "two"]);
    }

    #[test]
    fn start_clears_previous_log() {
        let recorder = Recorder::new();
        recorder.start();
        recorder.append("old");
        recorder.start();
        recorder.append("new");
        assert_eq!(recorder.recorded(), vec!["new"]);
    }
}
