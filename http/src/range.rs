/// Inclusive byte range resolved against a resource of known length.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parses a single-range `Range` header value (`bytes=a-b`, `bytes=a-`,
    /// `bytes=-n`). Returns `None` when the range is malformed or cannot be
    /// satisfied for a resource of `total` bytes.
    pub fn parse(value: &str, total: u64) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?;
        if spec.contains(',') || total == 0 {
            return None;
        }

        let (start, end) = spec.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        let range = match (start.is_empty(), end.is_empty()) {
            (true, true) => return None,
            // Suffix
            (true, false) => {
                let n: u64 = end.parse().ok()?;
                if n == 0 {
                    return None;
                }
                Self {
                    start: total.saturating_sub(n),
                    end: total - 1,
                }
            }
            (false, true) => Self {
                start: start.parse().ok()?,
                end: total - 1,
            },
            (false, false) => {
                let start: u64 = start.parse().ok()?;
                let end: u64 = end.parse().ok()?;
                Self {
                    start,
                    end: end.min(total - 1),
                }
            }
        };

        if range.start > range.end || range.start >= total {
            return None;
        }

        Some(range)
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! range {
        ($start:expr, $end:expr) => {
            Some(ByteRange {
                start: $start,
                end: $end,
            })
        };
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(ByteRange::parse("bytes=0-99", 1000), range!(0, 99));
        assert_eq!(ByteRange::parse("bytes=500-", 1000), range!(500, 999));
        assert_eq!(ByteRange::parse("bytes=-100", 1000), range!(900, 999));
        assert_eq!(ByteRange::parse("bytes=-5000", 1000), range!(0, 999));
        assert_eq!(ByteRange::parse("bytes=900-5000", 1000), range!(900, 999));
    }

    #[test]
    fn reject_unsatisfiable() {
        assert_eq!(ByteRange::parse("bytes=1000-", 1000), None);
        assert_eq!(ByteRange::parse("bytes=50-10", 1000), None);
        assert_eq!(ByteRange::parse("bytes=-0", 1000), None);
        assert_eq!(ByteRange::parse("bytes=0-", 0), None);
    }

    #[test]
    fn reject_malformed() {
        assert_eq!(ByteRange::parse("items=0-1", 10), None);
        assert_eq!(ByteRange::parse("bytes=0-1,4-5", 10), None);
        assert_eq!(ByteRange::parse("bytes=-", 10), None);
        assert_eq!(ByteRange::parse("bytes=a-b", 10), None);
    }

    #[test]
    fn content_range_header() {
        let range = ByteRange { start: 0, end: 99 };
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 0-99/1000");
    }
}
