use std::sync::Mutex;

/// Fire-and-forget speech output.
pub trait VoiceService: Send + Sync {
    fn speak(&self, text: &str);
}

/// Writes announcements to the log instead of a speaker.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingVoice;

impl VoiceService for TracingVoice {
    fn speak(&self, text: &str) {
        tracing::info!(target: "navigator::voice", "🔊 {text}");
    }
}

/// Keeps every announcement in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct RecordingVoice {
    spoken: Mutex<Vec<String>>,
}

impl RecordingVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|spoken| spoken.clone())
            .unwrap_or_default()
    }
}

impl VoiceService for RecordingVoice {
    fn speak(&self, text: &str) {
        tracing::info!(target: "navigator::voice", "🔊 {text}");
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_owned());
        }
    }
}
