use std::fmt;
use std::time::Duration;

use reqwest::{header, StatusCode};

use crate::{TransportError, TransportStatus};

const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";
const GRPC_STATUS: &str = "grpc-status";
const GRPC_MESSAGE: &str = "grpc-message";

const DATA_FRAME: u8 = 0x00;
const TRAILER_FRAME: u8 = 0x80;
const FRAME_HEADER_LEN: usize = 5;

/// Unary gRPC-web transport to a single node.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone)]
pub struct HttpChannel {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChannel")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpChannel {
    /// Creates a channel with its own HTTP client.
    pub fn new(address: impl AsRef<str>) -> Self {
        Self::with_client(reqwest::Client::new(), address)
    }

    /// Creates a channel sharing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, address: impl AsRef<str>) -> Self {
        Self {
            http,
            base_url: normalize_base_url(address.as_ref()),
        }
    }

    /// Normalized base URL every call is posted under.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs one unary call to `path` (e.g. `/proto.CryptoService/getAccountBalance`).
    pub async fn unary(&self, path: &str, message: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.send(path, message, None).await
    }

    /// Like [`HttpChannel::unary`] with an HTTP-level timeout.
    pub async fn unary_with_timeout(
        &self,
        path: &str,
        message: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.send(path, message, Some(timeout)).await
    }

    async fn send(
        &self,
        path: &str,
        message: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, GRPC_WEB_CONTENT_TYPE)
            .header("x-grpc-web", "1")
            .body(encode_frame(message));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let header_status = grpc_status_from_headers(response.headers());
        if !status.is_success() {
            let (code, message) = header_status.unwrap_or_else(|| {
                (
                    status_from_http(status),
                    format!("unexpected HTTP status {}", status.as_u16()),
                )
            });
            return Err(TransportError::new(code, message));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let frames = parse_frames(&body)?;
        let (code, message) = frames
            .trailers
            .as_deref()
            .and_then(grpc_status_from_trailers)
            .or(header_status)
            .unwrap_or((TransportStatus::Ok, String::new()));

        if code != TransportStatus::Ok {
            return Err(TransportError::new(code, message));
        }
        frames.message.ok_or_else(|| {
            TransportError::new(TransportStatus::Internal, "response carried no message frame")
        })
    }
}

fn normalize_base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    }
}

pub(crate) fn encode_frame(message: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + message.len());
    frame.push(DATA_FRAME);
    frame.extend_from_slice(&(message.len() as u32).to_be_bytes());
    frame.extend_from_slice(message);
    frame
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Frames {
    pub message: Option<Vec<u8>>,
    pub trailers: Option<String>,
}

pub(crate) fn parse_frames(mut body: &[u8]) -> Result<Frames, TransportError> {
    let mut frames = Frames::default();
    while !body.is_empty() {
        if body.len() < FRAME_HEADER_LEN {
            return Err(malformed("truncated frame header"));
        }
        let flag = body[0];
        let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
        let payload = body
            .get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)
            .ok_or_else(|| malformed("frame length exceeds body"))?;

        if flag & TRAILER_FRAME != 0 {
            frames.trailers = Some(String::from_utf8_lossy(payload).into_owned());
        } else if frames.message.is_none() {
            frames.message = Some(payload.to_vec());
        } else {
            return Err(malformed("unary response carried more than one message"));
        }
        body = &body[FRAME_HEADER_LEN + len..];
    }
    Ok(frames)
}

fn malformed(reason: &str) -> TransportError {
    TransportError::new(
        TransportStatus::Internal,
        format!("malformed grpc-web body: {reason}"),
    )
}

fn grpc_status_from_headers(headers: &header::HeaderMap) -> Option<(TransportStatus, String)> {
    let code: u32 = headers.get(GRPC_STATUS)?.to_str().ok()?.trim().parse().ok()?;
    let message = headers
        .get(GRPC_MESSAGE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    Some((TransportStatus::from_code(code), message))
}

pub(crate) fn grpc_status_from_trailers(trailers: &str) -> Option<(TransportStatus, String)> {
    let mut code = None;
    let mut message = String::new();
    for line in trailers.split("\r\n").filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(GRPC_STATUS) {
            code = value.trim().parse::<u32>().ok();
        } else if name.trim().eq_ignore_ascii_case(GRPC_MESSAGE) {
            message = value.trim().to_owned();
        }
    }
    code.map(|code| (TransportStatus::from_code(code), message))
}

pub(crate) fn status_from_http(status: StatusCode) -> TransportStatus {
    match status {
        StatusCode::BAD_REQUEST => TransportStatus::Internal,
        StatusCode::UNAUTHORIZED => TransportStatus::Unauthenticated,
        StatusCode::FORBIDDEN => TransportStatus::PermissionDenied,
        StatusCode::NOT_FOUND => TransportStatus::Unimplemented,
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => TransportStatus::Unavailable,
        _ => TransportStatus::Unknown,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let status = if err.is_timeout() {
        TransportStatus::DeadlineExceeded
    } else if err.is_connect() {
        TransportStatus::Unavailable
    } else {
        TransportStatus::Unknown
    };
    TransportError::new(status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        encode_frame, grpc_status_from_trailers, normalize_base_url, parse_frames,
        status_from_http, HttpChannel,
    };
    use crate::TransportStatus;
    use reqwest::StatusCode;

    #[test]
    fn frame_header_is_flag_and_big_endian_length() {
        let frame = encode_frame(b"abc");
        assert_eq!(frame, vec![0, 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn parses_message_and_trailers() {
        let mut body = encode_frame(b"payload");
        let trailers = b"grpc-status:0\r\ngrpc-message:\r\n";
        body.push(0x80);
        body.extend_from_slice(&(trailers.len() as u32).to_be_bytes());
        body.extend_from_slice(trailers);

        let frames = parse_frames(&body).expect("must parse");
        assert_eq!(frames.message.as_deref(), Some(&b"payload"[..]));
        assert_eq!(
            grpc_status_from_trailers(frames.trailers.as_deref().unwrap()),
            Some((TransportStatus::Ok, String::new()))
        );
    }

    #[test]
    fn rejects_truncated_frames() {
        let mut body = encode_frame(b"payload");
        body.truncate(6);
        let err = parse_frames(&body).expect_err("must fail");
        assert_eq!(err.status, TransportStatus::Internal);

        let err = parse_frames(&[0, 0]).expect_err("must fail");
        assert_eq!(err.status, TransportStatus::Internal);
    }

    #[test]
    fn trailer_names_are_case_insensitive() {
        let parsed = grpc_status_from_trailers("Grpc-Status: 14\r\nGRPC-MESSAGE: node down\r\n");
        assert_eq!(
            parsed,
            Some((TransportStatus::Unavailable, "node down".to_owned()))
        );
        assert_eq!(grpc_status_from_trailers("x-other: 1\r\n"), None);
    }

    #[test]
    fn http_statuses_map_to_grpc_codes() {
        assert_eq!(
            status_from_http(StatusCode::SERVICE_UNAVAILABLE),
            TransportStatus::Unavailable
        );
        assert_eq!(
            status_from_http(StatusCode::TOO_MANY_REQUESTS),
            TransportStatus::Unavailable
        );
        assert_eq!(
            status_from_http(StatusCode::UNAUTHORIZED),
            TransportStatus::Unauthenticated
        );
        assert_eq!(
            status_from_http(StatusCode::NOT_FOUND),
            TransportStatus::Unimplemented
        );
        assert_eq!(
            status_from_http(StatusCode::IM_A_TEAPOT),
            TransportStatus::Unknown
        );
    }

    #[test]
    fn base_url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(normalize_base_url("127.0.0.1:50211"), "http://127.0.0.1:50211");
        assert_eq!(
            normalize_base_url("https://node.example:443/"),
            "https://node.example:443"
        );
        assert_eq!(
            HttpChannel::new("localhost:8080").base_url(),
            "http://localhost:8080"
        );
    }
}
