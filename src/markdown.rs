use once_cell::sync::Lazy;
use regex::Regex;

static INLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|\*(.+?)\*|`(.+?)`|\$(.+?)\$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStyle {
    Plain,
    Bold,
    Italic,
    Code,
    Math,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub style: SegmentStyle,
}

impl TextSegment {
    fn new(text: &str, style: SegmentStyle) -> Self {
        Self {
            text: text.to_string(),
            style,
        }
    }
}

/// Splits a label into styled runs: `**bold**`, `*italic*`, `` `code` `` and `$math$`.
///
/// Text without any markup comes back as a single plain segment.
pub fn parse_markdown(input: &str) -> Vec<TextSegment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in INLINE_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            segments.push(TextSegment::new(
                &input[last..whole.start()],
                SegmentStyle::Plain,
            ));
        }
        let styled = [
            SegmentStyle::Bold,
            SegmentStyle::Italic,
            SegmentStyle::Code,
            SegmentStyle::Math,
        ]
        .into_iter()
        .enumerate()
        .find_map(|(i, style)| caps.get(i + 1).map(|m| TextSegment::new(m.as_str(), style)));
        if let Some(segment) = styled {
            segments.push(segment);
        }
        last = whole.end();
    }
    if last < input.len() {
        segments.push(TextSegment::new(&input[last..], SegmentStyle::Plain));
    }
    if segments.is_empty() {
        segments.push(TextSegment::new(input, SegmentStyle::Plain));
    }
    segments
}

pub fn has_markup(segments: &[TextSegment]) -> bool {
    segments.iter().any(|s| s.style != SegmentStyle::Plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_segment() {
        let segments = parse_markdown("just text");
        assert_eq!(segments, vec![TextSegment::new("just text", SegmentStyle::Plain)]);
        assert!(!has_markup(&segments));
    }

    #[test]
    fn empty_input_gives_one_empty_segment() {
        assert_eq!(parse_markdown(""), vec![TextSegment::new("", SegmentStyle::Plain)]);
    }

    #[test]
    fn mixed_markup_is_split_in_order() {
        let segments = parse_markdown("a **b** *c* `d` $e$ f");
        let styles: Vec<SegmentStyle> = segments.iter().map(|s| s.style).collect();
        assert_eq!(
            styles,
            vec![
                SegmentStyle::Plain,
                SegmentStyle::Bold,
                SegmentStyle::Plain,
                SegmentStyle::Italic,
                SegmentStyle::Plain,
                SegmentStyle::Code,
                SegmentStyle::Plain,
                SegmentStyle::Math,
                SegmentStyle::Plain,
            ]
        );
        assert_eq!(segments[1].text, "b");
        assert_eq!(segments[8].text, " f");
    }

    #[test]
    fn unterminated_markers_stay_literal() {
        let segments = parse_markdown("5 * 3");
        assert_eq!(segments, vec![TextSegment::new("5 * 3", SegmentStyle::Plain)]);
    }
}
