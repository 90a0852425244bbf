//! Sinks for the inbound text channel.
//!
//! Text chunks arrive mid-word; sinks print or collect them as-is without
//! adding separators.

use crate::error::Result;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for server-generated text chunks.
pub trait TextSink: Send {
    fn handle(&mut self, chunk: &str) -> Result<()>;
}

/// Prints chunks to stdout immediately, flushing so partial lines appear as
/// the model speaks.
#[derive(Debug, Default)]
pub struct StdoutTextSink;

impl TextSink for StdoutTextSink {
    fn handle(&mut self, chunk: &str) -> Result<()> {
        print!("{}", chunk);
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Collects chunks into a shared string for tests.
#[derive(Debug, Clone, Default)]
pub struct CollectorTextSink {
    collected: Arc<Mutex<String>>,
}

impl CollectorTextSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything handled so far, concatenated.
    pub fn text(&self) -> String {
        self.collected
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl TextSink for CollectorTextSink {
    fn handle(&mut self, chunk: &str) -> Result<()> {
        if let Ok(mut guard) = self.collected.lock() {
            guard.push_str(chunk);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_concatenates_in_order() {
        let mut sink = CollectorTextSink::new();
        sink.handle("Bon").unwrap();
        sink.handle("jour").unwrap();
        sink.handle(" !").unwrap();
        assert_eq!(sink.text(), "Bonjour !");
    }

    #[test]
    fn test_collector_clones_share_contents() {
        let mut sink = CollectorTextSink::new();
        let reader = sink.clone();
        sink.handle("hello").unwrap();
        assert_eq!(reader.text(), "hello");
    }

    #[test]
    fn test_stdout_sink_accepts_chunks() {
        let mut sink = StdoutTextSink;
        assert!(sink.handle("").is_ok());
    }
}
