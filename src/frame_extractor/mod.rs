//! FrameExtractor - Stream Reassembly
//!
//! ## Responsibilities
//!
//! - Accumulate raw bytes read from one controller connection
//! - Cut complete `<Event>...</Event>` documents out of the stream
//! - Keep any incomplete tail for the next read
//!
//! One extractor belongs to exactly one connection and is never shared.

/// Closing tag that terminates every event document
pub const END_MARKER: &[u8] = b"</Event>";

/// One complete event document cut from the byte stream
///
/// Immutable once produced. The relay forwards this text unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(String);

impl RawFrame {
    /// Borrow the document text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned document text
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Per-connection frame extractor
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
}

impl FrameExtractor {
    /// Create an extractor with an empty carry-over buffer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append `bytes` and return every frame completed by them, in arrival order
    ///
    /// Bytes are kept raw until a frame is complete so that a multi-byte
    /// UTF-8 sequence split across reads is decoded intact.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        // Resume the marker search just before the newly appended bytes
        let mut search_from = self
            .buffer
            .len()
            .saturating_sub(bytes.len() + END_MARKER.len() - 1);

        while let Some(pos) = find_marker(&self.buffer, search_from) {
            let end = pos + END_MARKER.len();
            let consumed: Vec<u8> = self.buffer.drain(..end).collect();
            search_from = 0;

            let text = String::from_utf8_lossy(&consumed);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            frames.push(RawFrame(trimmed.to_string()));
        }

        if !frames.is_empty() {
            tracing::trace!(
                frames = frames.len(),
                pending_bytes = self.buffer.len(),
                "Frames extracted"
            );
        }

        frames
    }

    /// Number of bytes retained waiting for a closing marker
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_marker(haystack: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < END_MARKER.len() || from > haystack.len() - END_MARKER.len() {
        return None;
    }
    haystack[from..]
        .windows(END_MARKER.len())
        .position(|w| w == END_MARKER)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<Event><ETYPE>IN</ETYPE><TRDESC>Door Open</TRDESC></Event>";

    fn texts(frames: Vec<RawFrame>) -> Vec<String> {
        frames.into_iter().map(RawFrame::into_string).collect()
    }

    #[test]
    fn test_single_complete_document() {
        let mut extractor = FrameExtractor::new();
        let frames = extractor.feed(DOC.as_bytes());
        assert_eq!(texts(frames), vec![DOC.to_string()]);
        assert_eq!(extractor.pending(), 0);
    }

    #[test]
    fn test_partial_document_is_retained() {
        let mut extractor = FrameExtractor::new();
        assert!(extractor.feed(b"<Event><ETYPE>IN</ETYPE>").is_empty());
        assert_eq!(extractor.pending(), 24);
        assert!(extractor.feed(b"").is_empty());
        assert_eq!(extractor.pending(), 24);
    }

    #[test]
    fn test_marker_split_across_reads() {
        let mut extractor = FrameExtractor::new();
        let (head, tail) = DOC.split_at(DOC.len() - 4);
        assert!(extractor.feed(head.as_bytes()).is_empty());
        let frames = extractor.feed(tail.as_bytes());
        assert_eq!(texts(frames), vec![DOC.to_string()]);
    }

    #[test]
    fn test_multiple_documents_in_one_read() {
        let mut extractor = FrameExtractor::new();
        let input = format!("{}\r\n  {}\n<Event><ETYPE>", DOC, DOC.replace("IN", "OUT"));
        let frames = texts(extractor.feed(input.as_bytes()));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], DOC);
        assert_eq!(frames[1], DOC.replace("IN", "OUT"));
        assert_eq!(extractor.pending(), "\n<Event><ETYPE>".len());
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let mut extractor = FrameExtractor::new();
        let frames = extractor.feed(format!("\n\n  {}", DOC).as_bytes());
        assert_eq!(texts(frames), vec![DOC.to_string()]);
    }

    #[test]
    fn test_back_to_back_markers() {
        let mut extractor = FrameExtractor::new();
        let frames = texts(extractor.feed(b"   </Event></Event>"));
        assert_eq!(frames, vec!["</Event>".to_string(), "</Event>".to_string()]);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole_feed() {
        let input = format!(
            "{}\n{}\n<Event><STAFFNAME>Zoë Ångström</STAFFNAME></Event> trailing",
            DOC, DOC
        );

        let mut whole = FrameExtractor::new();
        let expected = texts(whole.feed(input.as_bytes()));
        assert_eq!(expected.len(), 3);

        let mut bytewise = FrameExtractor::new();
        let mut actual = Vec::new();
        for b in input.as_bytes() {
            actual.extend(texts(bytewise.feed(std::slice::from_ref(b))));
        }

        assert_eq!(actual, expected);
        assert_eq!(bytewise.pending(), whole.pending());
    }

    #[test]
    fn test_arbitrary_split_points_match_whole_feed() {
        let input = format!("{}{}  {}", DOC, DOC, DOC);
        let mut whole = FrameExtractor::new();
        let expected = texts(whole.feed(input.as_bytes()));

        for split in 0..input.len() {
            let (a, b) = input.as_bytes().split_at(split);
            let mut extractor = FrameExtractor::new();
            let mut actual = texts(extractor.feed(a));
            actual.extend(texts(extractor.feed(b)));
            assert_eq!(actual, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let doc = "<Event><STAFFNAME>José</STAFFNAME></Event>";
        let bytes = doc.as_bytes();
        let split = doc.find('é').map(|i| i + 1).unwrap_or(0);
        let mut extractor = FrameExtractor::new();
        assert!(extractor.feed(&bytes[..split]).is_empty());
        let frames = texts(extractor.feed(&bytes[split..]));
        assert_eq!(frames, vec![doc.to_string()]);
    }
}
