/// Descriptive utterances collected for the current session, in spoken order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionBuffer {
    utterances: Vec<String>,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, utterance: impl Into<String>) {
        self.utterances.push(utterance.into());
    }

    pub fn join(&self) -> String {
        self.utterances.join(" ")
    }

    pub fn clear(&mut self) {
        self.utterances.clear();
    }

    /// Takes the joined text and leaves the buffer empty.
    pub fn drain_joined(&mut self) -> String {
        let joined = self.join();
        self.clear();
        joined
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn utterances(&self) -> &[String] {
        self.utterances.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::SessionBuffer;

    #[test]
    fn join_uses_single_space_and_keeps_order() {
        let mut buffer = SessionBuffer::new();
        buffer.push("a wooden");
        buffer.push("rocking chair");
        buffer.push("a wooden");
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.join(), "a wooden rocking chair a wooden");
    }

    #[test]
    fn drain_joined_clears() {
        let mut buffer = SessionBuffer::new();
        buffer.push("lamp");
        assert_eq!(buffer.drain_joined(), "lamp");
        assert!(buffer.is_empty());
        assert_eq!(buffer.join(), "");
    }
}
