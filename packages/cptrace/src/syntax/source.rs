//! Byte offset helpers over source text.

/// Maps byte offsets to 1-indexed line numbers.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    /// Column (0-indexed, in bytes) of an offset within its line.
    pub fn column_of(&self, offset: usize) -> usize {
        let line = self.line_of(offset);
        offset - self.line_starts[line - 1]
    }
}

pub fn slice_text(source: &str, start: usize, end: usize) -> String {
    source
        .get(start..end)
        .map(|text| text.to_string())
        .unwrap_or_default()
}

/// Strip up to `column` leading whitespace characters from every line after
/// the first, so a fragment can be re-indented at a different depth.
pub fn dedent_fragment(text: &str, column: usize) -> String {
    let mut lines = text.split('\n');
    let mut out = String::with_capacity(text.len());
    if let Some(first) = lines.next() {
        out.push_str(first);
    }
    for line in lines {
        out.push('\n');
        let strip = line
            .char_indices()
            .take_while(|(i, c)| *i < column && (*c == ' ' || *c == '\t'))
            .count();
        out.push_str(&line[strip..]);
    }
    out
}

/// Collapse a possibly multi-line snippet onto one line for labels.
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_of() {
        let index = LineIndex::new("a = 1\nb = 2\n\nc = 3");
        assert_eq!(index.line_of(0), 1);
        assert_eq!(index.line_of(4), 1);
        assert_eq!(index.line_of(6), 2);
        assert_eq!(index.line_of(12), 3);
        assert_eq!(index.line_of(13), 4);
        assert_eq!(index.column_of(15), 2);
    }

    #[test]
    fn test_dedent_fragment() {
        let text = "if x:\n        y = 1\n    z = 2";
        assert_eq!(dedent_fragment(text, 4), "if x:\n    y = 1\nz = 2");
    }

    #[test]
    fn test_one_line() {
        assert_eq!(one_line("a and\n    b"), "a and b");
    }
}
