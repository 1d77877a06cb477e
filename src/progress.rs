use std::sync::Mutex;

use serde::Serialize;

pub const VALIDATED: u8 = 10;
pub const QUERY_STARTED: u8 = 15;
pub const SCENE_FETCH: u8 = 20;
pub const SCENE_COMPUTE: u8 = 40;
pub const ARCHIVED: u8 = 90;
pub const DONE: u8 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct Progress<'a> {
    sink: &'a dyn ProgressSink,
    current: Mutex<u8>,
}

impl<'a> Progress<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            current: Mutex::new(0),
        }
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = (*current).max(percent.min(DONE));
        self.sink.event(ProgressEvent {
            percent: *current,
            message: message.into(),
        });
    }

    pub fn current(&self) -> u8 {
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u8>>,
    }

    impl ProgressSink for Recorder {
        fn event(&self, event: ProgressEvent) {
            self.seen.lock().unwrap().push(event.percent);
        }
    }

    #[test]
    fn progress_never_moves_backwards() {
        let recorder = Recorder::default();
        let progress = Progress::new(&recorder);
        progress.report(VALIDATED, "validated");
        progress.report(SCENE_COMPUTE, "computing A");
        progress.report(SCENE_FETCH, "fetch B");
        progress.report(DONE, "done");

        assert_eq!(*recorder.seen.lock().unwrap(), vec![10, 40, 40, 100]);
    }
}
