// ABOUTME: Per-run debug log collector passed through the pipelines
// ABOUTME: Timestamped entries, flushed once by the caller after a run

use chrono::Utc;

#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        RunLog::default()
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        if message.is_empty() {
            return;
        }
        let stamp = Utc::now().format("%H:%M:%S");
        self.entries.push(format!("[{} UTC] {}", stamp, message));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any entry contains the given fragment. Test helper mostly.
    pub fn contains(&self, fragment: &str) -> bool {
        self.entries.iter().any(|e| e.contains(fragment))
    }

    pub fn flush_to(&mut self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        for entry in self.entries.drain(..) {
            writeln!(out, "{}", entry)?;
        }
        Ok(())
    }
}
