use crate::{Header, HttpVersion};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StatusCode {
    Ok,
    NoContent,
    PartialContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    RangeNotSatisfiable,
    InternalServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn to_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "200 OK",
            StatusCode::NoContent => "204 No Content",
            StatusCode::PartialContent => "206 Partial Content",
            StatusCode::BadRequest => "400 Bad Request",
            StatusCode::NotFound => "404 Not Found",
            StatusCode::MethodNotAllowed => "405 Method Not Allowed",
            StatusCode::RangeNotSatisfiable => "416 Range Not Satisfiable",
            StatusCode::InternalServerError => "500 Internal Server Error",
            StatusCode::NotImplemented => "501 Not Implemented",
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NoContent => 204,
            StatusCode::PartialContent => 206,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RangeNotSatisfiable => 416,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ResponseStartLine {
    pub version: HttpVersion,
    pub status: StatusCode,
}

impl ResponseStartLine {
    pub fn serialize_with_crlf_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.version.to_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.to_str().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Response<'a> {
    pub start_line: ResponseStartLine,
    pub headers: Vec<Header>,
    pub body: Option<&'a [u8]>,
}

impl<'a> Response<'a> {
    /// HTTP/1.1 response with `Content-Length` set from `body`.
    pub fn new(status: StatusCode, body: Option<&'a [u8]>) -> Self {
        let len = body.map(|b| b.len()).unwrap_or(0);
        Self {
            start_line: ResponseStartLine {
                version: HttpVersion::OneDotOne,
                status,
            },
            headers: vec![Header::new("Content-Length", len.to_string())],
            body,
        }
    }

    pub fn json(status: StatusCode, body: &'a [u8]) -> Self {
        Self::new(status, Some(body)).with_header("Content-Type", "application/json")
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, None)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Replaces an existing header of the same (case-insensitive) name.
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|h| h.key.eq_ignore_ascii_case(key))
        {
            Some(header) => header.value = value,
            None => self.headers.push(Header::new(key, value)),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.start_line.status
    }

    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        self.start_line.serialize_with_crlf_into(buf);

        for header in &self.headers {
            header.serialize_with_crlf_into(buf);
        }

        buf.extend_from_slice(b"\r\n");

        if let Some(body) = &self.body {
            buf.extend_from_slice(body);
        }
    }
}
