//! Line-level markdown helpers shared by the parsers.

/// One line of a document.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    /// Byte offset of the line start
    pub offset: usize,
    /// Line content including its terminator
    pub raw: &'a str,
    /// Line content without the terminator
    pub text: &'a str,
    /// Inside a fenced code block (delimiters included)
    pub fenced: bool,
}

/// Split text into lines, marking fenced code blocks.
pub(crate) fn lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut fence: Option<&str> = None;

    for raw in text.split_inclusive('\n') {
        let line_text = raw.trim_end_matches(['\n', '\r']);
        let marker = fence_marker(line_text);

        let fenced = match (fence, marker) {
            (None, Some(m)) => {
                fence = Some(m);
                true
            }
            (Some(open), Some(m)) if m == open => {
                fence = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        };

        out.push(Line {
            offset,
            raw,
            text: line_text,
            fenced,
        });
        offset += raw.len();
    }

    out
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}
