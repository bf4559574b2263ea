use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::{FilePayload, TransportError, BOUNDARY_PREFIX};

const BOUNDARY_SUFFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl MultipartPart {
    pub fn into_file(self) -> FilePayload {
        FilePayload::new(
            self.data,
            self.filename.as_deref(),
            self.content_type.as_deref(),
        )
    }
}

/// A fully framed multipart/form-data body ready to send.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub body: Bytes,
    pub boundary: String,
    pub content_type: String,
    pub content_length: usize,
}

impl EncodedBody {
    pub fn headers(&self) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&self.content_type)
                .map_err(|err| TransportError::Header(err.to_string()))?,
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.content_length));
        Ok(headers)
    }
}

/// Frames `file` as the single part `field` of a multipart/form-data body.
pub fn encode_multipart(file: &FilePayload, field: &str) -> EncodedBody {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_SUFFIX_LEN)
        .map(char::from)
        .collect();
    let boundary = format!("{BOUNDARY_PREFIX}{suffix}");

    let preamble = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        quote_safe(field),
        quote_safe(&file.file_name),
        header_safe(&file.content_type),
    );
    let ending = format!("\r\n--{boundary}--\r\n");

    let mut body = BytesMut::with_capacity(preamble.len() + file.bytes.len() + ending.len());
    body.put_slice(preamble.as_bytes());
    body.put_slice(&file.bytes);
    body.put_slice(ending.as_bytes());
    let body = body.freeze();

    EncodedBody {
        content_length: body.len(),
        content_type: format!("multipart/form-data; boundary={boundary}"),
        boundary,
        body,
    }
}

fn quote_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '"' | '\r' | '\n') { '_' } else { c })
        .collect()
}

fn header_safe(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(start);
    }
    if start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| start + pos)
}

fn multipart_boundary(content_type: &str) -> Result<String, TransportError> {
    for part in content_type.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("boundary") {
            continue;
        }

        let value = value.trim();
        let unquoted = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        if !unquoted.trim().is_empty() {
            return Ok(unquoted.to_string());
        }
    }

    Err(TransportError::InvalidMultipart(
        "multipart boundary is missing".into(),
    ))
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

fn skip_line_break(bytes: &[u8], cursor: usize) -> usize {
    if bytes.get(cursor..cursor + 2) == Some(b"\r\n") {
        cursor + 2
    } else if bytes.get(cursor..cursor + 1) == Some(b"\n") {
        cursor + 1
    } else {
        cursor
    }
}

/// Splits a multipart/form-data body into its parts. Part data is sliced
/// from `body` without copying.
pub fn parse_multipart_form(
    content_type: &str,
    body: &Bytes,
) -> Result<Vec<MultipartPart>, TransportError> {
    let malformed = |reason: &str| TransportError::InvalidMultipart(reason.to_string());

    let boundary = multipart_boundary(content_type)?;
    let boundary_marker = format!("--{boundary}");
    let boundary_bytes = boundary_marker.as_bytes();

    let bytes = body.as_ref();
    let mut cursor = find_subslice(bytes, boundary_bytes, 0)
        .ok_or_else(|| malformed("body missing boundary marker"))?
        + boundary_bytes.len();

    let mut parts = Vec::new();
    loop {
        if bytes.get(cursor..cursor + 2) == Some(b"--") {
            break;
        }
        cursor = skip_line_break(bytes, cursor);

        let (headers_end, separator_len) =
            if let Some(idx) = find_subslice(bytes, b"\r\n\r\n", cursor) {
                (idx, 4)
            } else if let Some(idx) = find_subslice(bytes, b"\n\n", cursor) {
                (idx, 2)
            } else {
                return Err(malformed("part missing header separator"));
            };

        let headers_raw = String::from_utf8_lossy(&bytes[cursor..headers_end]);
        let mut name = None;
        let mut filename = None;
        let mut part_content_type = None;

        for line in headers_raw.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for item in value.split(';').map(str::trim) {
                    if let Some(value) = item.strip_prefix("name=") {
                        name = Some(unquote(value));
                    } else if let Some(value) = item.strip_prefix("filename=") {
                        filename = Some(unquote(value));
                    }
                }
            } else if key.trim().eq_ignore_ascii_case("content-type") && !value.is_empty() {
                part_content_type = Some(value.to_string());
            }
        }

        let name = name.ok_or_else(|| malformed("part missing content-disposition name"))?;
        let data_start = headers_end + separator_len;

        // Parts end at the next boundary line, terminated by CRLF or LF.
        let crlf_delimiter = format!("\r\n{boundary_marker}");
        let lf_delimiter = format!("\n{boundary_marker}");
        let (data_end, delimiter_len) =
            match find_subslice(bytes, crlf_delimiter.as_bytes(), data_start) {
                Some(idx) => (idx, crlf_delimiter.len()),
                None => find_subslice(bytes, lf_delimiter.as_bytes(), data_start)
                    .map(|idx| (idx, lf_delimiter.len()))
                    .ok_or_else(|| malformed("part missing trailing boundary"))?,
            };

        parts.push(MultipartPart {
            name,
            filename,
            content_type: part_content_type,
            data: body.slice(data_start..data_end),
        });

        cursor = data_end + delimiter_len;
        if bytes.get(cursor..cursor + 2) == Some(b"--") {
            break;
        }
    }

    Ok(parts)
}
