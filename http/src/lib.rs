use std::{error::Error, fmt::Display};

pub mod range;
pub mod request;
pub mod response;

pub use range::ByteRange;
pub use request::{Header, HttpVersion, Request, RequestMethod, RequestStartLine};
pub use response::{Response, ResponseStartLine, StatusCode};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HttpError {
    StartLineEmpty,
    InvalidRequestMethod,
    StartLineMissingTarget,
    InvalidRequestTarget,
    StartLineMissingVersion,
    StartLineInvalidVersion,
    InvalidHeaderKey,
    InvalidHeaderValue,
    InvalidRequest,
    InvalidContentLength,
    HeadTooLarge,
    BodyTooLarge,
}

impl Error for HttpError {}

impl Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            HttpError::StartLineEmpty => "request start line is empty",
            HttpError::InvalidRequestMethod => "invalid request method",
            HttpError::StartLineMissingTarget => "request start line is missing a target",
            HttpError::InvalidRequestTarget => "request target is not valid UTF-8",
            HttpError::StartLineMissingVersion => "request start line is missing a version",
            HttpError::StartLineInvalidVersion => "invalid HTTP version",
            HttpError::InvalidHeaderKey => "invalid header key",
            HttpError::InvalidHeaderValue => "invalid header value",
            HttpError::InvalidRequest => "malformed request",
            HttpError::InvalidContentLength => "invalid Content-Length",
            HttpError::HeadTooLarge => "request head is too large",
            HttpError::BodyTooLarge => "request body is too large",
        };
        f.write_str(msg)
    }
}

/// Largest accepted request head (start line and headers).
pub const MAX_HEAD_SIZE: usize = 16 * 1024;
/// Largest accepted request body. Only small JSON bodies are expected.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

#[inline]
pub(crate) fn extract_line(buf: &[u8]) -> Option<&[u8]> {
    let mut i = 0;
    while i < buf.len() && buf[i] != b'\r' {
        i += 1;
    }

    if i + 1 >= buf.len() || buf[i + 1] != b'\n' {
        return None;
    }

    Some(&buf[0..i])
}

/// Total number of bytes the request in `buf` occupies, once its head has
/// fully arrived. `Ok(None)` means more data is needed.
pub fn expected_request_len(buf: &[u8]) -> Result<Option<usize>, HttpError> {
    let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        if buf.len() > MAX_HEAD_SIZE {
            return Err(HttpError::HeadTooLarge);
        }
        return Ok(None);
    };

    let head_len = head_end + 4;
    let mut content_length = 0usize;

    for line in buf[..head_end].split(|b| *b == b'\n').skip(1) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|b| *b == b':') else {
            continue;
        };
        if line[..colon].eq_ignore_ascii_case(b"content-length") {
            content_length = std::str::from_utf8(&line[colon + 1..])
                .map_err(|_| HttpError::InvalidContentLength)?
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::InvalidContentLength)?;
        }
    }

    if content_length > MAX_BODY_SIZE {
        return Err(HttpError::BodyTooLarge);
    }

    head_len
        .checked_add(content_length)
        .map(Some)
        .ok_or(HttpError::BodyTooLarge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_len_waits_for_head() {
        assert_eq!(expected_request_len(b"GET / HTTP/1.1\r\nHost: a\r\n"), Ok(None));
        assert_eq!(
            expected_request_len(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"),
            Ok(Some(27))
        );
    }

    #[test]
    fn expected_len_includes_body() {
        let req = b"POST /api/connect HTTP/1.1\r\ncontent-length: 11\r\n\r\n";
        assert_eq!(expected_request_len(req), Ok(Some(req.len() + 11)));
    }

    #[test]
    fn expected_len_rejects_garbage_length() {
        assert_eq!(
            expected_request_len(b"POST / HTTP/1.1\r\nContent-Length: ab\r\n\r\n"),
            Err(HttpError::InvalidContentLength)
        );
    }

    #[test]
    fn expected_len_limits_head() {
        let buf = vec![b'a'; MAX_HEAD_SIZE + 1];
        assert_eq!(expected_request_len(&buf), Err(HttpError::HeadTooLarge));
    }

    #[test]
    fn expected_len_limits_body() {
        assert_eq!(
            expected_request_len(
                b"POST /api/remote HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n"
            ),
            Err(HttpError::BodyTooLarge)
        );

        let req = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_SIZE + 1
        );
        assert_eq!(
            expected_request_len(req.as_bytes()),
            Err(HttpError::BodyTooLarge)
        );

        let req = format!("POST / HTTP/1.1\r\nContent-Length: {MAX_BODY_SIZE}\r\n\r\n");
        assert_eq!(
            expected_request_len(req.as_bytes()),
            Ok(Some(req.len() + MAX_BODY_SIZE))
        );
    }
}
