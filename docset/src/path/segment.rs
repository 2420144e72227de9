use smallvec::SmallVec;

/// One step of a parsed key path.
///
/// A `Key` may still act as an array index at interpretation time when it is
/// all digits and the node under it is an array; the distinction between
/// "field named 2" and "third element" depends on the document, not the
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A named key, e.g. `a` in `"a.b"`.
    Key(String),
    /// A bracketed single index, e.g. `[2]`.
    Index(usize),
    /// A bracketed index list, e.g. `[1, 3]`.
    IndexList(Vec<usize>),
}

/// Parses a key path into its segment sequence.
///
/// Splits on `.` and `[...]` groups. Bracket bodies that are comma lists of
/// integers become [Segment::Index]/[Segment::IndexList] (whitespace around
/// commas is tolerated); any other bracket body is kept as a literal key.
pub fn parse(path: &str) -> SmallVec<[Segment; 4]> {
    let mut segments: SmallVec<[Segment; 4]> = SmallVec::new();
    let mut rest = path;
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('.') {
            rest = stripped;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix('[') {
            match stripped.find(']') {
                Some(end) => {
                    let body = &stripped[..end];
                    rest = &stripped[end + 1..];
                    match parse_index_list(body) {
                        Some(mut list) if list.len() == 1 => {
                            segments.push(Segment::Index(list.remove(0)))
                        }
                        Some(list) => segments.push(Segment::IndexList(list)),
                        None => segments.push(Segment::Key(body.trim().to_string())),
                    }
                }
                None => {
                    // unterminated bracket: keep the remainder as a literal key
                    segments.push(Segment::Key(rest.to_string()));
                    rest = "";
                }
            }
            continue;
        }
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        let token = &rest[..end];
        if !token.is_empty() {
            segments.push(Segment::Key(token.to_string()));
        }
        rest = &rest[end..];
    }
    segments
}

fn parse_index_list(body: &str) -> Option<Vec<usize>> {
    let mut list = Vec::new();
    for part in body.split(',') {
        let part = part.trim();
        list.push(part.parse::<usize>().ok()?);
    }
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

/// Returns the numeric form of a key that is all digits.
#[inline]
pub(crate) fn numeric_key(key: &str) -> Option<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}
