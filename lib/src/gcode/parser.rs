//! G-code line tokenizer.
//!
//! Splits a source line into a command word, parameter letters with
//! optional numeric values, and a trailing comment. Parsing is
//! deliberately tolerant: a malformed parameter is skipped rather than
//! failing the line, because unrecognized lines pass through the
//! compressor unmodified anyway.

/// A single parameter: an uppercase letter and its numeric value, if
/// one followed (`G28 X` homes without a value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    pub letter: char,
    pub value: Option<f64>,
}

/// A tokenized G-code line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCommand {
    /// Normalized command word (`G1`, `M83`, ...), empty when the line
    /// holds no command.
    pub command: String,
    /// Parameters following the command word, in source order.
    pub parameters: Vec<Parameter>,
    /// Comment text after `;`, without the semicolon, trimmed.
    pub comment: String,
}

impl ParsedCommand {
    /// True when the line carried no command (blank or comment-only).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    /// Value of the first parameter with the given letter.
    pub fn parameter(&self, letter: char) -> Option<f64> {
        self.parameters
            .iter()
            .find(|p| p.letter == letter)
            .and_then(|p| p.value)
    }

    /// True when a parameter with the given letter is present, with or
    /// without a value.
    pub fn has_parameter(&self, letter: char) -> bool {
        self.parameters.iter().any(|p| p.letter == letter)
    }
}

/// Tokenize one source line. Never fails; lines without a command come
/// back with an empty command word.
pub fn parse_line(line: &str) -> ParsedCommand {
    let mut parsed = ParsedCommand::default();

    // Split off the comment first; everything after ';' is text
    let code = match line.find(';') {
        Some(idx) => {
            parsed.comment = line[idx + 1..].trim().to_string();
            &line[..idx]
        }
        None => line,
    };

    let mut chars = code.char_indices().peekable();
    let mut first_word = true;

    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        // A checksum terminates the parsable portion of the line
        if c == '*' {
            break;
        }
        if !c.is_ascii_alphabetic() {
            // Stray character: skip it rather than failing the line
            chars.next();
            continue;
        }

        let letter = c.to_ascii_uppercase();
        chars.next();

        // Collect the numeric portion, if any
        let start = chars.peek().map(|&(i, _)| i);
        let mut end = start;
        while let Some(&(i, n)) = chars.peek() {
            if n.is_ascii_digit() || n == '.' || n == '-' || n == '+' {
                chars.next();
                end = Some(i + n.len_utf8());
            } else {
                break;
            }
        }
        let value = match (start, end) {
            (Some(s), Some(e)) if e > s => code[s..e].parse::<f64>().ok(),
            _ => None,
        };

        if first_word {
            // Skip a leading line number (N42 G1 ...)
            if letter == 'N' {
                continue;
            }
            first_word = false;
            match value {
                // Normalize G01 -> G1, M082 -> M82, keep G38.2 as is
                Some(v) => parsed.command = format!("{}{}", letter, v),
                None => {
                    // A bare letter is not a command; treat it as a
                    // valueless parameter of nothing and move on
                    continue;
                }
            }
        } else {
            parsed.parameters.push(Parameter { letter, value });
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_linear_move() {
        let cmd = parse_line("G1 X10.5 Y-3.25 E0.0421 F1800");
        assert_eq!(cmd.command, "G1");
        assert_eq!(cmd.parameter('X'), Some(10.5));
        assert_eq!(cmd.parameter('Y'), Some(-3.25));
        assert_eq!(cmd.parameter('E'), Some(0.0421));
        assert_eq!(cmd.parameter('F'), Some(1800.0));
        assert!(cmd.comment.is_empty());
    }

    #[test]
    fn test_parse_without_spaces() {
        let cmd = parse_line("G1X10Y5E.25");
        assert_eq!(cmd.command, "G1");
        assert_eq!(cmd.parameter('X'), Some(10.0));
        assert_eq!(cmd.parameter('Y'), Some(5.0));
        assert_eq!(cmd.parameter('E'), Some(0.25));
    }

    #[test]
    fn test_parse_comment_only() {
        let cmd = parse_line("; layer 3, z = 0.6");
        assert!(cmd.is_empty());
        assert_eq!(cmd.comment, "layer 3, z = 0.6");
    }

    #[test]
    fn test_parse_trailing_comment() {
        let cmd = parse_line("G1 X1 Y2 ; outer wall");
        assert_eq!(cmd.command, "G1");
        assert_eq!(cmd.comment, "outer wall");
    }

    #[test]
    fn test_parse_blank_line() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
    }

    #[test]
    fn test_parse_normalizes_command() {
        assert_eq!(parse_line("g01 x1").command, "G1");
        assert_eq!(parse_line("M082").command, "M82");
        assert_eq!(parse_line("G38.2 Z-5").command, "G38.2");
    }

    #[test]
    fn test_parse_line_number_and_checksum() {
        let cmd = parse_line("N42 G1 X10 Y0 *71");
        assert_eq!(cmd.command, "G1");
        assert_eq!(cmd.parameter('X'), Some(10.0));
        // The checksum is not a parameter
        assert!(!cmd.has_parameter('*'));
    }

    #[test]
    fn test_parse_valueless_parameter() {
        let cmd = parse_line("G28 X Y");
        assert_eq!(cmd.command, "G28");
        assert!(cmd.has_parameter('X'));
        assert!(cmd.has_parameter('Y'));
        assert_eq!(cmd.parameter('X'), None);
    }

    #[test]
    fn test_parse_malformed_value_is_skipped() {
        let cmd = parse_line("G1 X1.2.3 Y5");
        assert_eq!(cmd.command, "G1");
        assert_eq!(cmd.parameter('X'), None);
        assert_eq!(cmd.parameter('Y'), Some(5.0));
    }
}
