//! Lexer for the recognition tag grammar.
//!
//! `raw_text` interleaves plain text with two tag forms:
//!
//! ```text
//! <|ref|>inner<|/ref|>
//! <|det|>[[x1,y1,x2,y2],[x1,y1,x2,y2]]<|/det|>
//! ```
//!
//! An explicit scanner (rather than regex substitution) keeps the
//! hypothesis-ordering and tolerance logic downstream auditable and lets
//! malformed tags degrade predictably: an unterminated tag is kept as
//! literal text, a det payload that fails to parse yields an empty
//! quadruple list and the tag contributes nothing.

const REF_OPEN: &str = "<|ref|>";
const REF_CLOSE: &str = "<|/ref|>";
const DET_OPEN: &str = "<|det|>";
const DET_CLOSE: &str = "<|/det|>";

/// One lexed span of `raw_text`, in original order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Plain text outside any tag. Preserved verbatim.
    Text(String),
    /// Inner content of a reference wrapper.
    Ref(String),
    /// Bounding-box quadruples of a detection tag. Empty when the payload
    /// was malformed.
    Det(Vec<[f64; 4]>),
}

/// Split `raw` into text, ref, and det segments.
pub fn lex(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = raw;
    let mut text = String::new();

    while !rest.is_empty() {
        let ref_at = rest.find(REF_OPEN);
        let det_at = rest.find(DET_OPEN);

        let (at, is_ref) = match (ref_at, det_at) {
            (Some(r), Some(d)) if r <= d => (r, true),
            (Some(_), Some(d)) => (d, false),
            (Some(r), None) => (r, true),
            (None, Some(d)) => (d, false),
            (None, None) => break,
        };

        let (open, close) = if is_ref {
            (REF_OPEN, REF_CLOSE)
        } else {
            (DET_OPEN, DET_CLOSE)
        };

        let body_start = at + open.len();
        let Some(close_at) = rest[body_start..].find(close) else {
            // Unterminated tag: keep everything from the opener as text.
            break;
        };

        text.push_str(&rest[..at]);
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }

        let inner = &rest[body_start..body_start + close_at];
        segments.push(if is_ref {
            Segment::Ref(inner.to_string())
        } else {
            Segment::Det(parse_quads(inner).unwrap_or_default())
        });

        rest = &rest[body_start + close_at + close.len()..];
    }

    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

/// Parse a det payload: `[[x1,y1,x2,y2](,[x1,y1,x2,y2])*]`.
fn parse_quads(payload: &str) -> Option<Vec<[f64; 4]>> {
    let outer = payload.trim();
    let inner = outer.strip_prefix('[')?.strip_suffix(']')?;

    let mut quads = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        let body = rest.strip_prefix('[')?;
        let end = body.find(']')?;
        quads.push(parse_quad(&body[..end])?);

        rest = body[end + 1..].trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
        } else if !rest.is_empty() {
            return None;
        }
    }

    if quads.is_empty() {
        None
    } else {
        Some(quads)
    }
}

/// Parse exactly four comma-separated numbers.
fn parse_quad(body: &str) -> Option<[f64; 4]> {
    let mut coords = [0.0f64; 4];
    let mut parts = body.split(',');
    for slot in &mut coords {
        *slot = parts.next()?.trim().parse::<f64>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(coords)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_segment() {
        assert_eq!(lex("hello world"), vec![Segment::Text("hello world".into())]);
    }

    #[test]
    fn ref_and_det_adjacent() {
        let segments = lex("<|ref|>text<|/ref|><|det|>[[0,0,10,10]]<|/det|>tail");
        assert_eq!(
            segments,
            vec![
                Segment::Ref("text".into()),
                Segment::Det(vec![[0.0, 0.0, 10.0, 10.0]]),
                Segment::Text("tail".into()),
            ]
        );
    }

    #[test]
    fn gap_text_between_tags_preserved() {
        let segments = lex("<|ref|>a<|/ref|>middle<|ref|>b<|/ref|>");
        assert_eq!(
            segments,
            vec![
                Segment::Ref("a".into()),
                Segment::Text("middle".into()),
                Segment::Ref("b".into()),
            ]
        );
    }

    #[test]
    fn multiple_quadruples() {
        let segments = lex("<|det|>[[1,2,3,4],[5, 6, 7, 8]]<|/det|>");
        assert_eq!(
            segments,
            vec![Segment::Det(vec![
                [1.0, 2.0, 3.0, 4.0],
                [5.0, 6.0, 7.0, 8.0]
            ])]
        );
    }

    #[test]
    fn float_coordinates() {
        let segments = lex("<|det|>[[1.5,2.25,3.0,4.75]]<|/det|>");
        assert_eq!(segments, vec![Segment::Det(vec![[1.5, 2.25, 3.0, 4.75]])]);
    }

    #[test]
    fn malformed_det_payload_yields_empty() {
        assert_eq!(lex("<|det|>[[1,2,3]]<|/det|>"), vec![Segment::Det(vec![])]);
        assert_eq!(lex("<|det|>nonsense<|/det|>"), vec![Segment::Det(vec![])]);
        assert_eq!(
            lex("<|det|>[[1,2,3,4,5]]<|/det|>"),
            vec![Segment::Det(vec![])]
        );
    }

    #[test]
    fn unterminated_tag_kept_as_text() {
        assert_eq!(
            lex("before<|ref|>dangling"),
            vec![Segment::Text("before<|ref|>dangling".into())]
        );
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(lex("").is_empty());
    }
}
