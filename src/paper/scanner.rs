use crate::paper::error::DecodeError;
use crate::paper::model::Color;

/// Read head over a command stream.
///
/// The cursor is a byte offset that only moves forward. String payload
/// lengths count characters, not bytes, so accented text in labels decodes
/// the same way it was measured on the server.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Starts reading at `pos`, clamped to the stream length and moved back
    /// onto a char boundary.
    pub fn at(src: &'a str, pos: usize) -> Self {
        let mut pos = pos.min(src.len());
        while !src.is_char_boundary(pos) {
            pos -= 1;
        }
        Self { src, pos }
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// The character just before the cursor.
    pub fn previous(&self) -> Option<char> {
        self.src[..self.pos].chars().next_back()
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consumes `c` if it is the next character.
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Skips up to `count` characters, stopping at the end of the stream.
    pub fn skip(&mut self, count: usize) {
        for _ in 0..count {
            if self.next_char().is_none() {
                break;
            }
        }
    }

    /// Moves past the next occurrence of `c`, or to the end of the stream.
    pub fn skip_past(&mut self, c: char) {
        match self.rest().find(c) {
            Some(at) => self.pos += at + c.len_utf8(),
            None => self.pos = self.src.len(),
        }
    }

    pub fn jump_to_end(&mut self) {
        self.pos = self.src.len();
    }

    /// Reads a decimal number terminated by `,` or `;`, consuming the terminator.
    ///
    /// An empty number reads as zero. Any character other than a leading `-`,
    /// digits, a single `.` or a terminator is an error, and the cursor is left
    /// just past it.
    pub fn read_number(&mut self) -> Result<f64, DecodeError> {
        let start = self.pos;
        let mut seen_dot = false;
        loop {
            let offset = self.pos;
            let Some(c) = self.next_char() else {
                return Err(DecodeError::UnexpectedEnd { offset });
            };
            match c {
                '0'..='9' => {}
                '-' if offset == start => {}
                '.' if !seen_dot => seen_dot = true,
                ',' | ';' => {
                    let digits = &self.src[start..offset];
                    return Ok(parse_decimal(digits));
                }
                found => return Err(DecodeError::InvalidNumber { offset, found }),
            }
        }
    }

    /// Reads exactly `count` characters.
    pub fn read_chars(&mut self, count: usize) -> Result<&'a str, DecodeError> {
        let rest = self.rest();
        let len = match rest.char_indices().nth(count) {
            Some((byte, _)) => byte,
            None if rest.chars().count() == count => rest.len(),
            None => {
                self.pos = self.src.len();
                return Err(DecodeError::UnexpectedEnd {
                    offset: self.src.len(),
                });
            }
        };
        self.pos += len;
        Ok(&rest[..len])
    }

    /// Reads a `<len>,<chars>` string and skips the separator that follows it.
    pub fn read_string(&mut self) -> Result<&'a str, DecodeError> {
        let text = self.read_string_raw()?;
        self.skip(1);
        Ok(text)
    }

    /// Reads a `<len>,<chars>` string and leaves the cursor right after the payload.
    pub fn read_string_raw(&mut self) -> Result<&'a str, DecodeError> {
        let offset = self.pos;
        let len = self.read_number()?;
        if !(len >= 0.0 && len.fract() == 0.0) {
            return Err(DecodeError::InvalidLength { offset, value: len });
        }
        self.read_chars(len as usize)
    }

    /// Reads six hex digits and skips the delimiter after them.
    pub fn read_color(&mut self) -> Result<Color, DecodeError> {
        let offset = self.pos;
        let digits = self.read_chars(6)?;
        let mut rgb = [0u8; 3];
        hex::decode_to_slice(digits, &mut rgb).map_err(|_| DecodeError::InvalidColor { offset })?;
        self.skip(1);
        Ok(Color::rgb(rgb[0], rgb[1], rgb[2]))
    }
}

fn parse_decimal(digits: &str) -> f64 {
    match digits {
        "" | "." => 0.0,
        "-" | "-." => -0.0,
        _ => digits.parse().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_terminated_numbers() {
        let mut scanner = Scanner::new("12,-3.5;0.25,");
        assert_eq!(scanner.read_number(), Ok(12.0));
        assert_eq!(scanner.read_number(), Ok(-3.5));
        assert_eq!(scanner.previous(), Some(';'));
        assert_eq!(scanner.read_number(), Ok(0.25));
        assert!(scanner.is_at_end());
    }

    #[test]
    fn invalid_number_leaves_cursor_past_offender() {
        let mut scanner = Scanner::new("12x4;");
        assert_eq!(
            scanner.read_number(),
            Err(DecodeError::InvalidNumber {
                offset: 2,
                found: 'x'
            })
        );
        assert_eq!(scanner.position(), 3);
        assert_eq!(scanner.read_number(), Ok(4.0));
    }

    #[test]
    fn minus_only_allowed_in_front() {
        let mut scanner = Scanner::new("1-2;");
        assert!(matches!(
            scanner.read_number(),
            Err(DecodeError::InvalidNumber { found: '-', .. })
        ));
    }

    #[test]
    fn unterminated_number_is_unexpected_end() {
        let mut scanner = Scanner::new("42");
        assert_eq!(
            scanner.read_number(),
            Err(DecodeError::UnexpectedEnd { offset: 2 })
        );
    }

    #[test]
    fn strings_count_characters() {
        let mut scanner = Scanner::new("4,Olá!;3,abc,");
        assert_eq!(scanner.read_string(), Ok("Olá!"));
        assert_eq!(scanner.read_string(), Ok("abc"));
        assert!(scanner.is_at_end());
    }

    #[test]
    fn zero_length_string_skips_separator() {
        let mut scanner = Scanner::new("0,,7;");
        assert_eq!(scanner.read_string(), Ok(""));
        assert_eq!(scanner.read_number(), Ok(7.0));
    }

    #[test]
    fn short_string_payload_is_an_error() {
        let mut scanner = Scanner::new("9,abc");
        assert!(matches!(
            scanner.read_string(),
            Err(DecodeError::UnexpectedEnd { .. })
        ));
        assert!(scanner.is_at_end());
    }

    #[test]
    fn reads_colors() {
        let mut scanner = Scanner::new("FF8000;zzzzzz;");
        assert_eq!(scanner.read_color(), Ok(Color::rgb(255, 128, 0)));
        assert_eq!(scanner.position(), 7);
        assert_eq!(
            scanner.read_color(),
            Err(DecodeError::InvalidColor { offset: 7 })
        );
    }

    #[test]
    fn at_clamps_to_char_boundary() {
        let scanner = Scanner::at("á;", 1);
        assert_eq!(scanner.position(), 0);
        let scanner = Scanner::at("ab", 10);
        assert!(scanner.is_at_end());
    }
}
