//! HTTP `Range` header resolution.
//!
//! Only the single-range form `bytes=<start>-<end>` is understood. Either
//! bound may be omitted: a missing start means `0`, a missing end means the
//! last byte. Anything that does not describe an interval fully inside the
//! artifact resolves to [`ResolvedRange::Unsatisfiable`]; nothing is clamped.

/// Outcome of resolving a `Range` header against an artifact of known size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedRange {
    /// No header: serve the whole artifact with `200 OK`.
    Full { total_size: u64 },
    /// A satisfiable range: serve `start..=end` with `206 Partial Content`.
    Partial { start: u64, end: u64, total_size: u64 },
    /// Malformed or out of bounds: `416 Range Not Satisfiable`.
    Unsatisfiable { total_size: u64 },
}

impl ResolvedRange {
    /// HTTP status code for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Full { .. } => 200,
            Self::Partial { .. } => 206,
            Self::Unsatisfiable { .. } => 416,
        }
    }

    /// Whether the whole artifact is served.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    /// Inclusive byte bounds to read, or `None` when nothing is read
    /// (unsatisfiable, or a full read of an empty artifact).
    pub fn byte_bounds(&self) -> Option<(u64, u64)> {
        match *self {
            Self::Full { total_size } if total_size > 0 => Some((0, total_size - 1)),
            Self::Full { .. } => None,
            Self::Partial { start, end, .. } => Some((start, end)),
            Self::Unsatisfiable { .. } => None,
        }
    }

    /// Value for the `Content-Length` header.
    pub fn content_length(&self) -> u64 {
        self.byte_bounds()
            .map(|(start, end)| end - start + 1)
            .unwrap_or(0)
    }

    /// Value for the `Content-Range` header, if this outcome carries one.
    pub fn content_range(&self) -> Option<String> {
        match *self {
            Self::Full { .. } => None,
            Self::Partial {
                start,
                end,
                total_size,
            } => Some(format!("bytes {start}-{end}/{total_size}")),
            Self::Unsatisfiable { total_size } => Some(format!("bytes */{total_size}")),
        }
    }
}

/// Resolve an optional `Range` header value against `total_size`.
pub fn resolve_range(header: Option<&str>, total_size: u64) -> ResolvedRange {
    let Some(header) = header else {
        return ResolvedRange::Full { total_size };
    };

    match parse_single_range(header, total_size) {
        Some((start, end)) => ResolvedRange::Partial {
            start,
            end,
            total_size,
        },
        None => ResolvedRange::Unsatisfiable { total_size },
    }
}

/// Parse `bytes=<start>-<end>` into validated inclusive bounds.
fn parse_single_range(header: &str, total_size: u64) -> Option<(u64, u64)> {
    let header = header.trim();
    let (unit, set) = header.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }

    let set = set.trim();
    if set.contains(',') {
        return None;
    }

    let (start, end) = set.split_once('-')?;
    let last = total_size.checked_sub(1)?;

    let start = parse_bound(start.trim())?.unwrap_or(0);
    let end = parse_bound(end.trim())?.unwrap_or(last);

    if start > end || end > last {
        return None;
    }

    Some((start, end))
}

/// Parse one bound: `Some(None)` when empty, `None` when malformed.
fn parse_bound(raw: &str) -> Option<Option<u64>> {
    if raw.is_empty() {
        return Some(None);
    }
    // u64::from_str accepts a leading '+', which is not valid here
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u64>().ok().map(Some)
}
