//! SQL layout for display
//!
//! Puts each major clause on its own line and indents continuation lines by
//! two spaces. Only whitespace outside string literals and comments changes;
//! formatting an already formatted query returns it unchanged.

use regex::Regex;

lazy_static::lazy_static! {
    static ref CLAUSE_KEYWORD: Regex =
        Regex::new(r"(?i)\b(SELECT|FROM|WHERE|GROUP\s+BY|HAVING|ORDER\s+BY|LIMIT)\b").unwrap();
    static ref HORIZONTAL_SPACE: Regex = Regex::new(r"[ \t\r]+").unwrap();
}

const INDENT: &str = "  ";

/// Lexical pieces of a query. Quoted spans and comments are never rewritten.
#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Code(&'a str),
    Quoted(&'a str),
    Comment(&'a str),
    Newline,
}

pub fn format_sql_query(query: &str) -> String {
    let mut layout = Layout::default();

    for piece in scan(query) {
        match piece {
            Piece::Code(code) => layout.push_code(code),
            Piece::Quoted(quoted) => layout.push_text(quoted),
            Piece::Comment(comment) => layout.push_comment(comment),
            Piece::Newline => layout.break_line(),
        }
    }
    layout.break_line();

    layout
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| if i == 0 { line.clone() } else { format!("{}{}", INDENT, line) })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a query into code, quoted literals (`'...'` and `"..."` with doubled
/// quote escapes), `--` line comments and newlines. Delimiters are ASCII, so
/// every slice boundary is a char boundary.
fn scan(query: &str) -> Vec<Piece<'_>> {
    let bytes = query.as_bytes();
    let mut pieces = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => {
                push_code(&mut pieces, query, code_start, i);
                let end = quoted_end(bytes, i);
                pieces.push(Piece::Quoted(&query[i..end]));
                i = end;
                code_start = i;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                push_code(&mut pieces, query, code_start, i);
                let end = query[i..].find('\n').map(|p| i + p).unwrap_or(bytes.len());
                pieces.push(Piece::Comment(query[i..end].trim_end()));
                i = end;
                code_start = i;
            }
            b'\n' => {
                push_code(&mut pieces, query, code_start, i);
                pieces.push(Piece::Newline);
                i += 1;
                code_start = i;
            }
            _ => i += 1,
        }
    }
    push_code(&mut pieces, query, code_start, bytes.len());

    pieces
}

fn push_code<'a>(pieces: &mut Vec<Piece<'a>>, query: &'a str, start: usize, end: usize) {
    if start < end {
        pieces.push(Piece::Code(&query[start..end]));
    }
}

/// End (exclusive) of the quoted span opening at `start`. Unterminated spans
/// run to the end of the input.
fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

#[derive(Debug, Default)]
struct Layout {
    lines: Vec<String>,
    current: String,
}

impl Layout {
    /// Collapse horizontal whitespace and start a new line before each clause keyword.
    fn push_code(&mut self, code: &str) {
        let code = HORIZONTAL_SPACE.replace_all(code, " ");
        let mut start = 0;

        for m in CLAUSE_KEYWORD.find_iter(&code) {
            self.push_text(&code[start..m.start()]);
            self.break_line();
            start = m.start();
        }
        self.push_text(&code[start..]);
    }

    fn push_text(&mut self, text: &str) {
        if self.current.is_empty() {
            self.current.push_str(text.trim_start_matches(' '));
        } else {
            self.current.push_str(text);
        }
    }

    fn push_comment(&mut self, comment: &str) {
        if !self.current.is_empty() && !self.current.ends_with(' ') {
            self.current.push(' ');
        }
        self.current.push_str(comment);
    }

    /// Finish the current line. A keyword already at a line start does not
    /// produce an empty line.
    fn break_line(&mut self) {
        let line = self.current.trim_end_matches(' ');
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.current.clear();
    }
}
