// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

/// Splits the raw socket byte stream into text lines.
///
/// Bytes are appended as they arrive; every `\n` completes a line (one
/// trailing `\r` is dropped). Whatever follows the last terminator stays
/// buffered until the next chunk. Lines are decoded only once complete, so
/// a multi-byte character split across reads is never mangled.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and iterate over the lines it completed.
    ///
    /// Lines are extracted lazily; any not consumed before the iterator is
    /// dropped stay in the buffer and come out of the next call.
    pub fn push<'a>(&'a mut self, chunk: &[u8]) -> Lines<'a> {
        self.buffer.extend_from_slice(chunk);
        Lines { framer: self }
    }

    /// Extract the next complete line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// The unterminated tail currently buffered.
    pub fn partial(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Take the unterminated tail if `accept` says it is complete on its own.
    ///
    /// Used for prompts, which the bridge never terminates.
    pub fn take_partial_if(&mut self, accept: impl FnOnce(&str) -> bool) -> Option<String> {
        if self.buffer.is_empty() || self.buffer.contains(&b'\n') {
            return None;
        }
        let partial = self.partial();
        if accept(&partial) {
            self.buffer.clear();
            Some(partial)
        } else {
            None
        }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop everything buffered (used when a socket is replaced).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Lazy iterator over the lines completed by [`LineFramer::push`].
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_all(chunks: &[&[u8]]) -> (Vec<String>, String) {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(framer.push(chunk));
        }
        (lines, framer.partial())
    }

    #[test]
    fn test_single_chunk_multiple_lines() {
        let (lines, rest) = frame_all(&[b"~DEVICE,2,4,3\r\n~DEVICE,2,4,4\r\nGNET> "]);
        assert_eq!(lines, vec!["~DEVICE,2,4,3", "~DEVICE,2,4,4"]);
        assert_eq!(rest, "GNET> ");
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"~DEVI").count(), 0);
        assert_eq!(framer.buffered_len(), 5);
        let lines: Vec<String> = framer.push(b"CE,2,4,3\n").collect();
        assert_eq!(lines, vec!["~DEVICE,2,4,3"]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let (lines, rest) = frame_all(&[b"abc\r", b"\ndef\r\n"]);
        assert_eq!(lines, vec!["abc", "def"]);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let (lines, _) = frame_all(&[b"\r\n\nx\n"]);
        assert_eq!(lines, vec!["", "", "x"]);
    }

    #[test]
    fn test_unconsumed_lines_stay_buffered() {
        let mut framer = LineFramer::new();
        let first = framer.push(b"a\nb\nc").next();
        assert_eq!(first.as_deref(), Some("a"));
        let rest: Vec<String> = framer.push(b"\n").collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn test_take_partial_if() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"login: ").count(), 0);
        assert_eq!(framer.take_partial_if(|p| p.starts_with("password")), None);
        assert_eq!(framer.take_partial_if(|p| p.starts_with("login")).as_deref(), Some("login: "));
        assert_eq!(framer.buffered_len(), 0);
        assert_eq!(framer.take_partial_if(|_| true), None);
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let text = "Küche\n".as_bytes();
        let (lines, _) = frame_all(&[&text[..2], &text[2..]]);
        assert_eq!(lines, vec!["Küche"]);
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_lines(
            lines in proptest::collection::vec("[ -~]{0,20}", 0..8),
            cuts in proptest::collection::vec(any::<usize>(), 0..10),
        ) {
            let stream: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
            let bytes = stream.as_bytes();

            let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
            points.push(0);
            points.push(bytes.len());
            points.sort_unstable();
            points.dedup();

            let chunks: Vec<&[u8]> = points.windows(2).map(|w| &bytes[w[0]..w[1]]).collect();
            let (framed, rest) = frame_all(&chunks);

            prop_assert_eq!(framed, lines);
            prop_assert_eq!(rest, "");
        }
    }
}
