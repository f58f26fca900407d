//! G-code line model.
//!
//! A [`GcodeLine`] keeps the raw text of a line together with its parsed
//! opcode and numeric axis fields. Parsed fields remember the byte span of
//! their numeric literal, so a rewrite can re-render exactly one field and
//! leave every other byte of the line untouched (spacing, checksums, trailing
//! comments). Lines are immutable; [`GcodeLine::with_field`] produces a new
//! line.

/// Comment sigil used by all supported slicer dialects.
pub const COMMENT_SIGIL: char = ';';

/// One parsed axis field (letter + numeric literal).
#[derive(Debug, Clone, Copy)]
struct Field {
    letter: char,
    value: f64,
    /// Byte span of the numeric literal inside the raw text.
    num_start: usize,
    num_end: usize,
}

/// One line of a motion-control stream.
#[derive(Debug, Clone)]
pub struct GcodeLine {
    raw: String,
    /// Byte span of the opcode token, if the line has one.
    command: Option<(usize, usize)>,
    fields: Vec<Field>,
    /// Byte offset of the comment sigil, if present.
    comment: Option<usize>,
}

impl GcodeLine {
    /// Parse a single line. Parsing never fails: a field whose numeric
    /// literal does not parse is simply absent, and the line passes through
    /// unmodified downstream.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.to_owned();
        let comment = raw.find(COMMENT_SIGIL);
        let code_end = comment.unwrap_or(raw.len());

        // Tokenize the code part, keeping byte offsets.
        let mut tokens: Vec<(usize, usize)> = Vec::new();
        let mut start: Option<usize> = None;
        for (i, ch) in raw[..code_end].char_indices() {
            if ch.is_whitespace() {
                if let Some(s) = start.take() {
                    tokens.push((s, i));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push((s, code_end));
        }

        let command = tokens.first().copied();
        let mut fields = Vec::new();
        for &(s, e) in tokens.iter().skip(1) {
            let tok = &raw[s..e];
            let mut chars = tok.chars();
            let Some(letter) = chars.next() else { continue };
            if !letter.is_ascii_alphabetic() {
                continue;
            }
            let num = &tok[letter.len_utf8()..];
            if let Ok(value) = num.parse::<f64>() {
                fields.push(Field {
                    letter: letter.to_ascii_uppercase(),
                    value,
                    num_start: s + letter.len_utf8(),
                    num_end: e,
                });
            }
        }

        Self {
            raw,
            command,
            fields,
            comment,
        }
    }

    /// The raw text of the line.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Does the line start with the comment sigil?
    pub fn is_comment(&self) -> bool {
        self.raw.trim_start().starts_with(COMMENT_SIGIL)
    }

    /// The opcode token (e.g. `G1`, `M104`), if the line has a code part.
    pub fn command(&self) -> Option<&str> {
        let (s, e) = self.command?;
        if self.is_comment() {
            return None;
        }
        Some(&self.raw[s..e])
    }

    /// Is this a motion command (`G1`, `G2`, `G3`)?
    pub fn is_motion(&self) -> bool {
        matches!(self.command(), Some("G1" | "G2" | "G3"))
    }

    /// Value of the given axis field, if present and well-formed.
    pub fn field(&self, letter: char) -> Option<f64> {
        let letter = letter.to_ascii_uppercase();
        self.fields
            .iter()
            .find(|f| f.letter == letter)
            .map(|f| f.value)
    }

    /// Re-render one axis field at the given decimal precision, leaving all
    /// other bytes of the line intact. Returns `None` if the field is absent.
    pub fn with_field(&self, letter: char, value: f64, decimals: usize) -> Option<GcodeLine> {
        let letter = letter.to_ascii_uppercase();
        let field = self.fields.iter().find(|f| f.letter == letter)?;
        let mut raw = String::with_capacity(self.raw.len() + 8);
        raw.push_str(&self.raw[..field.num_start]);
        raw.push_str(&format!("{value:.decimals$}"));
        raw.push_str(&self.raw[field.num_end..]);
        Some(GcodeLine::parse(&raw))
    }
}
