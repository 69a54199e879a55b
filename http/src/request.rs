use crate::{HttpError, extract_line};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RequestMethod {
    Get,
    Post,
    Head,
    Delete,
    Put,
    Connect,
    Options,
    Trace,
    Patch,
}

impl RequestMethod {
    pub fn from_slice(method: &[u8]) -> Option<Self> {
        match method {
            b"GET" => Some(Self::Get),
            b"POST" => Some(Self::Post),
            b"HEAD" => Some(Self::Head),
            b"DELETE" => Some(Self::Delete),
            b"PUT" => Some(Self::Put),
            b"CONNECT" => Some(Self::Connect),
            b"OPTIONS" => Some(Self::Options),
            b"TRACE" => Some(Self::Trace),
            b"PATCH" => Some(Self::Patch),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Head => "HEAD",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Put => "PUT",
            RequestMethod::Connect => "CONNECT",
            RequestMethod::Options => "OPTIONS",
            RequestMethod::Trace => "TRACE",
            RequestMethod::Patch => "PATCH",
        }
    }

    /// Whether `prefix` (the first bytes of a connection) starts like an
    /// HTTP request line.
    pub fn sniff(prefix: &[u8]) -> bool {
        const TOKENS: [&[u8]; 9] = [
            b"GET ", b"POST", b"HEAD", b"DELE", b"PUT ", b"CONN", b"OPTI", b"TRAC", b"PATC",
        ];
        prefix.len() >= 4 && TOKENS.iter().any(|t| prefix[..4] == **t)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HttpVersion {
    ZeroDotNine,
    One,
    OneDotOne,
    Two,
    Three,
}

impl HttpVersion {
    pub fn from_slice(version: &[u8]) -> Option<Self> {
        match version {
            b"HTTP/0.9" => Some(Self::ZeroDotNine),
            b"HTTP/1.0" => Some(Self::One),
            b"HTTP/1.1" => Some(Self::OneDotOne),
            b"HTTP/2" => Some(Self::Two),
            b"HTTP/3" => Some(Self::Three),
            _ => None,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            HttpVersion::ZeroDotNine => "HTTP/0.9",
            HttpVersion::One => "HTTP/1.0",
            HttpVersion::OneDotOne => "HTTP/1.1",
            HttpVersion::Two => "HTTP/2",
            HttpVersion::Three => "HTTP/3",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RequestStartLine {
    pub method: RequestMethod,
    pub target: String,
    pub version: HttpVersion,
}

impl RequestStartLine {
    /// Takes in a start line buffer with the "\r\n" suffix removed and returns the parsed value
    pub fn parse(buf: &[u8]) -> Result<Self, HttpError> {
        if buf.is_empty() {
            return Err(HttpError::StartLineEmpty);
        }

        let mut parts = buf.splitn(3, |b| *b == b' ');

        let method = parts
            .next()
            .and_then(RequestMethod::from_slice)
            .ok_or(HttpError::InvalidRequestMethod)?;

        let target = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or(HttpError::StartLineMissingTarget)?;
        let target =
            String::from_utf8(target.to_vec()).map_err(|_| HttpError::InvalidRequestTarget)?;

        let version = parts
            .next()
            .filter(|v| !v.is_empty())
            .ok_or(HttpError::StartLineMissingVersion)?;
        let version = HttpVersion::from_slice(version).ok_or(HttpError::StartLineInvalidVersion)?;

        Ok(Self {
            method,
            target,
            version,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Takes in a header buffer with the "\r\n" suffix removed and returns the parsed value
    pub fn parse(header: &[u8]) -> Result<Self, HttpError> {
        let colon = header
            .iter()
            .position(|b| *b == b':')
            .ok_or(HttpError::InvalidHeaderKey)?;

        let key = &header[..colon];
        if key.is_empty() || key.contains(&b' ') {
            return Err(HttpError::InvalidHeaderKey);
        }
        let key = String::from_utf8(key.to_vec()).map_err(|_| HttpError::InvalidHeaderKey)?;

        let value = std::str::from_utf8(&header[colon + 1..])
            .map_err(|_| HttpError::InvalidHeaderValue)?
            .trim();
        if value.is_empty() {
            return Err(HttpError::InvalidHeaderValue);
        }

        Ok(Self {
            key,
            value: value.to_owned(),
        })
    }

    pub fn serialize_with_crlf_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(self.value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Request {
    pub start_line: RequestStartLine,
    pub headers: Vec<Header>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn parse(buf: &[u8]) -> Result<Self, HttpError> {
        let start_line_buf = extract_line(buf).ok_or(HttpError::InvalidRequest)?;
        let start_line = RequestStartLine::parse(start_line_buf)?;

        let mut headers: Vec<Header> = Vec::new();
        let mut content_length: Option<usize> = None;

        let mut i = start_line_buf.len() + 2;
        while i < buf.len() && buf[i] != b'\r' {
            let header_buf = extract_line(&buf[i..]).ok_or(HttpError::InvalidRequest)?;
            let header = Header::parse(header_buf)?;

            if header.key.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    header
                        .value
                        .parse::<usize>()
                        .map_err(|_| HttpError::InvalidContentLength)?,
                );
            }

            headers.push(header);

            i += header_buf.len() + 2;
        }

        if i + 1 >= buf.len() || buf[i + 1] != b'\n' {
            return Err(HttpError::InvalidRequest);
        }

        i += 2;

        let mut body = None;

        if let Some(content_length) = content_length {
            if content_length > 0 {
                if i + content_length > buf.len() {
                    return Err(HttpError::InvalidContentLength);
                }

                body = Some(buf[i..i + content_length].to_vec());
            }
        }

        Ok(Self {
            start_line,
            headers,
            body,
        })
    }

    pub fn method(&self) -> RequestMethod {
        self.start_line.method
    }

    /// Request target without its query string.
    pub fn path(&self) -> &str {
        let target = self.start_line.target.as_str();
        target.split_once('?').map(|(p, _)| p).unwrap_or(target)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }
}
