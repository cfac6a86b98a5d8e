//! Minimal XML element reader for controller event documents
//!
//! Controller documents are flat: one root with simple text children.
//! Nested elements, comments, CDATA, a prolog and attributes are tolerated
//! so that a well-formed document never fails here; anything unbalanced does.

use super::ParseError;

/// Parsed element tree node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Parse a complete document and return its root element
pub fn parse_document(input: &str) -> Result<Element, ParseError> {
    let mut reader = Reader { src: input, pos: 0 };

    reader.skip_misc()?;
    if reader.rest().is_empty() {
        return Err(ParseError::Malformed("empty document".to_string()));
    }
    let root = reader.element()?;
    reader.skip_misc()?;

    if !reader.rest().is_empty() {
        return Err(ParseError::Malformed(format!(
            "unexpected content after </{}>",
            root.name
        )));
    }

    Ok(root)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Skip whitespace, prolog/processing instructions, comments and doctype
    fn skip_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<!DOCTYPE") {
                self.skip_past(">", "doctype")?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<(), ParseError> {
        match self.rest().find(terminator) {
            Some(idx) => {
                self.pos += idx + terminator.len();
                Ok(())
            }
            None => Err(ParseError::Malformed(format!("unterminated {}", what))),
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        if len == 0 {
            return Err(ParseError::Malformed(format!(
                "expected element name at offset {}",
                self.pos
            )));
        }

        self.pos += len;
        Ok(rest[..len].to_string())
    }

    /// Skip attributes up to the end of a start tag; returns true for `/>`
    fn finish_start_tag(&mut self, name: &str) -> Result<bool, ParseError> {
        let mut quote: Option<char> = None;
        for (i, c) in self.rest().char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '<') => break,
                (None, '>') => {
                    let self_closing = self.rest()[..i].trim_end().ends_with('/');
                    self.pos += i + 1;
                    return Ok(self_closing);
                }
                _ => {}
            }
        }
        Err(ParseError::Malformed(format!("unterminated start tag <{}", name)))
    }

    fn element(&mut self) -> Result<Element, ParseError> {
        if !self.rest().starts_with('<') {
            return Err(ParseError::Malformed(format!(
                "expected '<' at offset {}",
                self.pos
            )));
        }
        self.pos += 1;

        let name = self.name()?;
        let mut element = Element {
            name,
            ..Default::default()
        };

        if self.finish_start_tag(&element.name)? {
            return Ok(element);
        }

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(ParseError::Malformed(format!(
                    "missing closing tag </{}>",
                    element.name
                )));
            }

            if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                self.skip_whitespace();
                if !self.rest().starts_with('>') {
                    return Err(ParseError::Malformed(format!(
                        "unterminated closing tag </{}",
                        closing
                    )));
                }
                self.pos += 1;

                if closing != element.name {
                    return Err(ParseError::Malformed(format!(
                        "mismatched closing tag: expected </{}>, found </{}>",
                        element.name, closing
                    )));
                }
                return Ok(element);
            } else if rest.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if rest.starts_with("<![CDATA[") {
                let body = &rest["<![CDATA[".len()..];
                let end = body
                    .find("]]>")
                    .ok_or_else(|| ParseError::Malformed("unterminated CDATA".to_string()))?;
                element.text.push_str(&body[..end]);
                self.pos += "<![CDATA[".len() + end + "]]>".len();
            } else if rest.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if rest.starts_with('<') {
                let child = self.element()?;
                element.children.push(child);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                element.text.push_str(&decode_entities(&rest[..end])?);
                self.pos += end;
            }
        }
    }
}

/// Decode the predefined XML entities and numeric character references
pub fn decode_entities(raw: &str) -> Result<String, ParseError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| ParseError::Malformed("unterminated entity reference".to_string()))?;
        let entity = &after[..semi];

        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
            }
            _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };

        match decoded {
            Some(c) => out.push(c),
            None => {
                return Err(ParseError::Malformed(format!(
                    "unknown entity &{};",
                    entity
                )))
            }
        }
        rest = &after[semi + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
