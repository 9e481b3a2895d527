//! Token streaming
//!
//! Generated text travels from the inference worker to the session over an
//! mpsc channel of [`StreamToken`]s. [`FragmentStream`] turns the receiving
//! end into a lazy, one-shot iterator.

use std::sync::mpsc::{self, Receiver};

use crate::inference::InferenceError;

/// A message sent by the inference worker
#[derive(Debug, Clone, PartialEq)]
pub enum StreamToken {
    /// A piece of generated text
    Token(String),
    /// Generation finished (normally or because it was cancelled)
    Done,
    /// Generation failed; nothing follows
    Error(InferenceError),
}

/// Lazy, finite, non-restartable sequence of generated fragments
pub struct FragmentStream {
    rx: Receiver<StreamToken>,
    finished: bool,
}

impl FragmentStream {
    pub fn new(rx: Receiver<StreamToken>) -> Self {
        Self { rx, finished: false }
    }

    /// A stream that replays `tokens` and then ends
    pub fn from_tokens(tokens: impl IntoIterator<Item = StreamToken>) -> Self {
        let (tx, rx) = mpsc::channel();
        for token in tokens {
            // The receiver is alive until we return it
            let _ = tx.send(token);
        }
        Self::new(rx)
    }
}

impl Iterator for FragmentStream {
    type Item = Result<String, InferenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.rx.recv() {
            Ok(StreamToken::Token(text)) => Some(Ok(text)),
            Ok(StreamToken::Done) => {
                self.finished = true;
                None
            }
            Ok(StreamToken::Error(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            Err(_) => {
                self.finished = true;
                Some(Err(InferenceError::WorkerDisconnected))
            }
        }
    }
}

/// Holds back text that may turn out to be the start of a stop sequence.
///
/// Fed one fragment at a time, it returns the text that is safe to show and
/// reports when a stop sequence has been seen. Stop strings are never emitted.
#[derive(Debug, Clone, Default)]
pub struct StopMatcher {
    stops: Vec<String>,
    pending: String,
    stopped: bool,
}

impl StopMatcher {
    pub fn new(stops: &[String]) -> Self {
        Self {
            stops: stops.iter().filter(|s| !s.is_empty()).cloned().collect(),
            pending: String::new(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Feed a fragment; returns the text that can be emitted now
    pub fn push(&mut self, fragment: &str) -> String {
        if self.stopped {
            return String::new();
        }
        self.pending.push_str(fragment);

        let earliest = self
            .stops
            .iter()
            .filter_map(|stop| self.pending.find(stop.as_str()))
            .min();
        if let Some(pos) = earliest {
            self.stopped = true;
            let out = self.pending[..pos].to_string();
            self.pending.clear();
            return out;
        }

        let keep = self.held_back_len();
        let split = self.pending.len() - keep;
        let out = self.pending[..split].to_string();
        self.pending.drain(..split);
        out
    }

    /// Release whatever is still held back once the stream has ended
    pub fn finish(&mut self) -> String {
        if self.stopped {
            return String::new();
        }
        std::mem::take(&mut self.pending)
    }

    /// Longest suffix of `pending` that is a proper prefix of some stop sequence
    fn held_back_len(&self) -> usize {
        let mut best = 0;
        for stop in &self.stops {
            let max = stop.len().saturating_sub(1).min(self.pending.len());
            for len in (best + 1..=max).rev() {
                let start = self.pending.len() - len;
                if !self.pending.is_char_boundary(start) {
                    continue;
                }
                if stop.starts_with(&self.pending[start..]) {
                    best = len;
                    break;
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stream_yields_tokens_then_ends() {
        let stream = FragmentStream::from_tokens(vec![
            StreamToken::Token("Hi".into()),
            StreamToken::Token(" there".into()),
            StreamToken::Done,
            StreamToken::Token("ignored".into()),
        ]);
        let items: Vec<_> = stream.collect();
        assert_eq!(items, vec![Ok("Hi".to_string()), Ok(" there".to_string())]);
    }

    #[test]
    fn test_stream_error_is_terminal() {
        let mut stream = FragmentStream::from_tokens(vec![
            StreamToken::Token("Partial".into()),
            StreamToken::Error(InferenceError::Runtime("boom".into())),
            StreamToken::Token("never".into()),
        ]);
        assert_eq!(stream.next(), Some(Ok("Partial".to_string())));
        assert_eq!(stream.next(), Some(Err(InferenceError::Runtime("boom".into()))));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_stream_without_done_reports_disconnect() {
        let mut stream = FragmentStream::from_tokens(vec![StreamToken::Token("a".into())]);
        assert_eq!(stream.next(), Some(Ok("a".to_string())));
        assert_eq!(stream.next(), Some(Err(InferenceError::WorkerDisconnected)));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_stop_matcher_passes_plain_text() {
        let mut matcher = StopMatcher::new(&stops(&["<|eot_id|>"]));
        assert_eq!(matcher.push("Hello"), "Hello");
        assert_eq!(matcher.push(" world"), " world");
        assert_eq!(matcher.finish(), "");
        assert!(!matcher.is_stopped());
    }

    #[test]
    fn test_stop_sequence_split_across_fragments() {
        let mut matcher = StopMatcher::new(&stops(&["<|eot_id|>"]));
        assert_eq!(matcher.push("Done.<|eo"), "Done.");
        assert_eq!(matcher.push("t_id|>trailing"), "");
        assert!(matcher.is_stopped());
        assert_eq!(matcher.push("more"), "");
        assert_eq!(matcher.finish(), "");
    }

    #[test]
    fn test_false_alarm_is_released() {
        let mut matcher = StopMatcher::new(&stops(&["<|eot_id|>"]));
        assert_eq!(matcher.push("a <"), "a ");
        assert_eq!(matcher.push("b"), "<b");
        assert_eq!(matcher.push("<|"), "");
        assert_eq!(matcher.finish(), "<|");
    }

    #[test]
    fn test_earliest_stop_wins() {
        let mut matcher = StopMatcher::new(&stops(&["END", "\nUser:"]));
        assert_eq!(matcher.push("ok\nUser: hi END"), "ok");
        assert!(matcher.is_stopped());
    }

    #[test]
    fn test_multibyte_text_is_not_split() {
        let mut matcher = StopMatcher::new(&stops(&["éé"]));
        assert_eq!(matcher.push("café"), "caf");
        assert_eq!(matcher.push("!"), "é!");
    }

    #[test]
    fn test_no_stops_is_passthrough() {
        let mut matcher = StopMatcher::new(&[]);
        assert_eq!(matcher.push("<|eot_id|>"), "<|eot_id|>");
    }
}
