use once_cell::sync::Lazy;
use regex::Regex;

static FENCED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(\w+)?\n(.*?)```\z").expect("valid regex"));

/// A piece of message content, either prose or a fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Code { language: String, code: String },
}

impl Segment {
    /// Label shown above a code block.
    pub fn label(language: &str) -> &str {
        if language.is_empty() {
            "code"
        } else {
            language
        }
    }
}

/// Split message content around fenced code blocks.
///
/// A fence that is not closed yet (a reply still streaming) stays text, as
/// does a closed fence without a newline after the language tag.
pub fn split_code_blocks(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for fence in FENCED.find_iter(content) {
        push_text(&mut segments, &content[last..fence.start()]);
        let block = fence.as_str();
        match CODE_BLOCK.captures(block) {
            Some(caps) => segments.push(Segment::Code {
                language: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                code: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }),
            None => push_text(&mut segments, block),
        }
        last = fence.end();
    }
    push_text(&mut segments, &content[last..]);

    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    // Merge with a preceding text run so callers see maximal prose runs
    if let Some(Segment::Text(previous)) = segments.last_mut() {
        previous.push_str(text);
    } else {
        segments.push(Segment::Text(text.to_string()));
    }
}
