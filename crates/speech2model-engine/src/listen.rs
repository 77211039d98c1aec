use std::io::{self, BufRead, ErrorKind};

use crate::error::RecognitionFailure;

/// Produces one utterance per listening cycle.
///
/// `Ok(None)` means the source is exhausted and the session loop should stop.
pub trait UtteranceSource {
    fn listen(&mut self) -> Result<Option<String>, RecognitionFailure>;
}

impl<T: UtteranceSource + ?Sized> UtteranceSource for Box<T> {
    fn listen(&mut self) -> Result<Option<String>, RecognitionFailure> {
        (**self).listen()
    }
}

/// Treats each typed line as one recognized utterance.
pub struct ConsoleSource<R> {
    reader: R,
    line: String,
}

impl ConsoleSource<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> ConsoleSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> UtteranceSource for ConsoleSource<R> {
    fn listen(&mut self) -> Result<Option<String>, RecognitionFailure> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(RecognitionFailure::ServiceUnavailable(err.to_string())),
            }
        }
        let text = self.line.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return Err(RecognitionFailure::Unintelligible);
        }
        Ok(Some(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{ConsoleSource, UtteranceSource};
    use crate::error::RecognitionFailure;

    #[test]
    fn console_source_yields_lines_then_exhausts() {
        let mut source = ConsoleSource::new(Cursor::new("a red chair\r\n\ncreate model"));
        assert_eq!(source.listen().ok().flatten().as_deref(), Some("a red chair"));
        assert!(matches!(
            source.listen(),
            Err(RecognitionFailure::Unintelligible)
        ));
        assert_eq!(source.listen().ok().flatten().as_deref(), Some("create model"));
        assert!(matches!(source.listen(), Ok(None)));
    }

    #[test]
    fn console_source_keeps_inner_spacing() {
        let mut source = ConsoleSource::new(Cursor::new("  a  lamp \n"));
        assert_eq!(source.listen().ok().flatten().as_deref(), Some("  a  lamp "));
    }
}
