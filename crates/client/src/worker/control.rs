/// Messages a page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate a waiting version right away.
    SkipWaiting,
}

impl ControlMessage {
    pub fn parse(message: &str) -> Option<Self> {
        match message.trim() {
            "skipWaiting" => Some(ControlMessage::SkipWaiting),
            _ => None,
        }
    }
}
