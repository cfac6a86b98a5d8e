//! EventNormalizer - Frame to Event Record
//!
//! ## Responsibilities
//!
//! - Parse one framed `<Event>` document
//! - Require every mandatory child element to be present and non-empty
//! - Pass values through unchanged (no date/time format validation)

mod xml;

use xml::{parse_document, Element};

use chrono::{DateTime, Utc};

use crate::frame_extractor::RawFrame;

/// Root element name of every controller document
pub const ROOT_ELEMENT: &str = "Event";

/// Child element names (case-sensitive, as sent by the controller)
pub mod fields {
    pub const ETYPE: &str = "ETYPE";
    pub const TRDESC: &str = "TRDESC";
    pub const STAFFNAME: &str = "STAFFNAME";
    pub const STAFFNO: &str = "STAFFNO";
    pub const CARDNO: &str = "CARDNO";
    pub const DEVNAME: &str = "DEVNAME";
    pub const TRDATE: &str = "TRDATE";
    pub const TRTIME: &str = "TRTIME";
}

/// Why a frame could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not a well-formed document
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// Well-formed, but rooted at something other than `<Event>`
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),

    /// A required child element is absent or empty
    #[error("missing required element <{0}>")]
    MissingField(&'static str),
}

/// Structured access-control event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub etype: String,
    pub trdesc: String,
    pub staffname: String,
    pub staffno: String,
    pub cardno: Option<String>,
    pub devname: String,
    /// YYYYMMDD as sent, not validated
    pub trdate: String,
    /// HHMMSS as sent, not validated
    pub trtime: String,
    pub ingested_at: DateTime<Utc>,
    /// Originating frame, forwarded verbatim
    pub raw: RawFrame,
}

impl NormalizedEvent {
    /// Original document text
    pub fn raw_xml(&self) -> &str {
        self.raw.as_str()
    }
}

/// Normalize one frame into an event record
pub fn normalize(frame: &RawFrame) -> Result<NormalizedEvent, ParseError> {
    let root = parse_document(frame.as_str())?;

    if root.name != ROOT_ELEMENT {
        return Err(ParseError::UnexpectedRoot(root.name));
    }

    Ok(NormalizedEvent {
        etype: required(&root, fields::ETYPE)?,
        trdesc: required(&root, fields::TRDESC)?,
        staffname: required(&root, fields::STAFFNAME)?,
        staffno: required(&root, fields::STAFFNO)?,
        cardno: optional(&root, fields::CARDNO),
        devname: required(&root, fields::DEVNAME)?,
        trdate: required(&root, fields::TRDATE)?,
        trtime: required(&root, fields::TRTIME)?,
        ingested_at: Utc::now(),
        raw: frame.clone(),
    })
}

fn optional(root: &Element, name: &str) -> Option<String> {
    root.child(name)
        .map(|e| e.text.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(root: &Element, name: &'static str) -> Result<String, ParseError> {
    optional(root, name).ok_or(ParseError::MissingField(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_extractor::FrameExtractor;

    const SAMPLE: &str = "<Event><ETYPE>IN</ETYPE><TRDESC>Door Open</TRDESC><STAFFNAME>Jane Doe</STAFFNAME><STAFFNO>E001</STAFFNO><DEVNAME>Lobby Door</DEVNAME><TRDATE>20250101</TRDATE><TRTIME>083000</TRTIME></Event>";

    fn frame(text: &str) -> RawFrame {
        let mut extractor = FrameExtractor::new();
        extractor
            .feed(text.as_bytes())
            .pop()
            .expect("test input must contain one frame")
    }

    #[test]
    fn test_normalize_sample() {
        let event = normalize(&frame(SAMPLE)).unwrap();
        assert_eq!(event.etype, "IN");
        assert_eq!(event.trdesc, "Door Open");
        assert_eq!(event.staffname, "Jane Doe");
        assert_eq!(event.staffno, "E001");
        assert_eq!(event.cardno, None);
        assert_eq!(event.devname, "Lobby Door");
        assert_eq!(event.trdate, "20250101");
        assert_eq!(event.trtime, "083000");
        assert_eq!(event.raw_xml(), SAMPLE);
    }

    #[test]
    fn test_card_number_is_optional() {
        let with_card = SAMPLE.replace("</TRTIME>", "</TRTIME><CARDNO>12345</CARDNO>");
        assert_eq!(
            normalize(&frame(&with_card)).unwrap().cardno.as_deref(),
            Some("12345")
        );

        let empty_card = SAMPLE.replace("</TRTIME>", "</TRTIME><CARDNO></CARDNO>");
        assert_eq!(normalize(&frame(&empty_card)).unwrap().cardno, None);
    }

    #[test]
    fn test_each_missing_required_field_fails() {
        for name in [
            fields::ETYPE,
            fields::TRDESC,
            fields::STAFFNAME,
            fields::STAFFNO,
            fields::DEVNAME,
            fields::TRDATE,
            fields::TRTIME,
        ] {
            let open = format!("<{}>", name);
            let close = format!("</{}>", name);
            let start = SAMPLE.find(&open).unwrap();
            let end = SAMPLE.find(&close).unwrap() + close.len();
            let stripped = format!("{}{}", &SAMPLE[..start], &SAMPLE[end..]);

            assert_eq!(
                normalize(&frame(&stripped)),
                Err(ParseError::MissingField(name)),
                "removing {}",
                name
            );
        }
    }

    #[test]
    fn test_empty_required_field_fails() {
        let doc = SAMPLE.replace("<STAFFNO>E001</STAFFNO>", "<STAFFNO>  </STAFFNO>");
        assert_eq!(
            normalize(&frame(&doc)),
            Err(ParseError::MissingField(fields::STAFFNO))
        );
    }

    #[test]
    fn test_lenient_values_pass_through() {
        let doc = SAMPLE
            .replace("20250101", "not-a-date")
            .replace("083000", "25:99");
        let event = normalize(&frame(&doc)).unwrap();
        assert_eq!(event.trdate, "not-a-date");
        assert_eq!(event.trtime, "25:99");
    }

    #[test]
    fn test_malformed_document() {
        let doc = "<Event><ETYPE>IN</TRDESC></Event>";
        assert!(matches!(
            normalize(&frame(doc)),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_garbage_before_marker() {
        assert!(matches!(
            normalize(&frame("hello world</Event>")),
            Err(ParseError::Malformed(_))
        ));
    }
}
