//! Shared per-batch progress state and its fixed-layout rendering.

use std::sync::{Mutex, PoisonError};

/// Width of the separator between worker lines and the summary line.
pub const SEPARATOR_WIDTH: usize = 30;

/// Receives a full redraw of the progress view.
///
/// Implementations replace whatever they showed before with `lines`; the
/// number of lines is fixed for a batch.
pub trait ProgressSink: Send + Sync {
    /// Clears the previous view and draws `lines`.
    fn redraw(&self, lines: &[String]);
}

/// A sink that discards every redraw.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn redraw(&self, _lines: &[String]) {}
}

/// Progress of one download batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    /// Label shown on the summary line (the category name).
    pub label: String,
    /// Number of files downloaded so far.
    pub completed: usize,
    /// Batch size.
    pub total: usize,
    /// Filename most recently finished by each worker slot.
    pub worker_slots: Vec<String>,
}

impl ProgressState {
    /// Creates a state with `slots` empty worker slots.
    #[must_use]
    pub fn new(label: impl Into<String>, total: usize, slots: usize) -> Self {
        Self {
            label: label.into(),
            completed: 0,
            total,
            worker_slots: vec![String::new(); slots],
        }
    }

    /// Renders the fixed layout: one line per worker, a separator, a summary.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .worker_slots
            .iter()
            .enumerate()
            .map(|(i, name)| format!("Worker {}: {name}", i + 1))
            .collect();
        lines.push("-".repeat(SEPARATOR_WIDTH));
        lines.push(format!(
            "{}: processing {}/{}",
            self.label, self.completed, self.total
        ));
        lines
    }
}

/// Guards a [`ProgressState`] and redraws a sink on every completion.
pub struct ProgressReporter<'a> {
    state: Mutex<ProgressState>,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressReporter<'a> {
    /// Starts reporting a batch.
    #[must_use]
    pub fn new(state: ProgressState, sink: &'a dyn ProgressSink) -> Self {
        Self {
            state: Mutex::new(state),
            sink,
        }
    }

    /// Draws the initial, empty view.
    pub fn draw(&self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.sink.redraw(&state.render());
    }

    /// Records a finished download in `slot` and redraws.
    ///
    /// The slot update, the counter increment and the redraw all happen
    /// while the lock is held. Out-of-range slots wrap around.
    pub fn record_completion(&self, slot: usize, filename: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slots = state.worker_slots.len();
        if slots > 0 {
            filename.clone_into(&mut state.worker_slots[slot % slots]);
        }
        state.completed += 1;
        self.sink.redraw(&state.render());
    }

    #[cfg(test)]
    fn snapshot(&self) -> ProgressState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Keeps every frame it is asked to draw.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) frames: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingSink {
        pub(crate) fn frames(&self) -> Vec<Vec<String>> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn redraw(&self, lines: &[String]) {
            self.frames.lock().unwrap().push(lines.to_vec());
        }
    }

    #[test]
    fn render_layout() {
        let mut state = ProgressState::new("photos", 3, 2);
        state.worker_slots[0] = "a.jpg".to_string();
        state.completed = 1;
        assert_eq!(
            state.render(),
            vec![
                "Worker 1: a.jpg".to_string(),
                "Worker 2: ".to_string(),
                "-".repeat(30),
                "photos: processing 1/3".to_string(),
            ]
        );
    }

    #[test]
    fn completion_updates_slot_count_and_redraws() {
        let sink = RecordingSink::default();
        let reporter = ProgressReporter::new(ProgressState::new("videos", 2, 2), &sink);

        reporter.record_completion(1, "clip.mp4");

        let state = reporter.snapshot();
        assert_eq!(state.completed, 1);
        assert_eq!(state.worker_slots, vec!["", "clip.mp4"]);
        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].last().unwrap(), "videos: processing 1/2");
    }

    #[test]
    fn slot_index_wraps() {
        let sink = NoProgress;
        let reporter = ProgressReporter::new(ProgressState::new("x", 5, 3), &sink);
        reporter.record_completion(4, "late.jpg");
        assert_eq!(reporter.snapshot().worker_slots[1], "late.jpg");
    }

    #[test]
    fn concurrent_completions_are_all_counted() {
        let sink = RecordingSink::default();
        let reporter = ProgressReporter::new(ProgressState::new("x", 400, 4), &sink);

        std::thread::scope(|scope| {
            for t in 0..8 {
                let reporter = &reporter;
                scope.spawn(move || {
                    for i in 0..50 {
                        reporter.record_completion(t, &format!("t{t}-{i}"));
                    }
                });
            }
        });

        let state = reporter.snapshot();
        assert_eq!(state.completed, 400);
        assert_eq!(sink.frames().len(), 400);
        // every frame's counter is distinct: no two redraws saw the same state
        let mut counters: Vec<String> = sink
            .frames()
            .iter()
            .map(|f| f.last().unwrap().clone())
            .collect();
        counters.dedup();
        assert_eq!(counters.len(), 400);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn render_has_slots_plus_two_lines(slots in 0usize..64, done in 0usize..1000) {
                let mut state = ProgressState::new("c", done, slots);
                state.completed = done;
                let lines = state.render();
                prop_assert_eq!(lines.len(), slots + 2);
                let expected = format!("c: processing {done}/{done}");
                prop_assert_eq!(lines.last().unwrap(), &expected);
            }
        }
    }
}
