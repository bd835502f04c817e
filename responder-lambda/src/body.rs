use crate::{BoxError, EventError, HeaderMap, HttpResponse, StatusCode};

use aws_lambda_events::encodings::Body;
use backtrace::Backtrace;
use base64::Engine as _;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt};
use http::header::CONTENT_TYPE;

use std::fmt::{Debug, Formatter};

/// Content types whose bodies are returned to the trigger as text rather than base64.
const TEXT_CONTENT_TYPES: [mime::Mime; 3] = [
  mime::TEXT_PLAIN,
  mime::APPLICATION_JSON,
  mime::APPLICATION_WWW_FORM_URLENCODED,
];

/// Unit of a streamed response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
  /// Chunk of body bytes.
  Data(Vec<u8>),
  /// Trailing headers sent after the last data chunk.
  Trailers(HeaderMap),
}

/// Body of an [`HttpResponse`](crate::HttpResponse).
///
/// Lambda outputs can't stream, so the body is always drained with [`collect`](Self::collect)
/// before the response is encoded.
pub struct ResponseBody(Inner);

enum Inner {
  Empty,
  Full(Vec<u8>),
  Stream(BoxStream<'static, Result<Frame, BoxError>>),
}

impl ResponseBody {
  /// Body without any content.
  pub fn empty() -> Self {
    Self(Inner::Empty)
  }

  /// Body produced by a stream of [`Frame`]s.
  pub fn from_stream<S>(stream: S) -> Self
  where
    S: Stream<Item = Result<Frame, BoxError>> + Send + 'static,
  {
    Self(Inner::Stream(stream.boxed()))
  }

  /// Drain the body into memory, along with any trailing headers.
  pub async fn collect(self) -> Result<CollectedBody, BoxError> {
    match self.0 {
      Inner::Empty => Ok(CollectedBody::default()),
      Inner::Full(data) => Ok(CollectedBody {
        data,
        trailers: HeaderMap::new(),
      }),
      Inner::Stream(mut stream) => {
        let mut collected = CollectedBody::default();
        while let Some(frame) = stream.try_next().await? {
          match frame {
            Frame::Data(chunk) => collected.data.extend_from_slice(&chunk),
            Frame::Trailers(trailers) => {
              for (name, value) in &trailers {
                collected.trailers.append(name.clone(), value.clone());
              }
            }
          }
        }
        Ok(collected)
      }
    }
  }
}

impl Debug for ResponseBody {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match &self.0 {
      Inner::Empty => f.write_str("ResponseBody::Empty"),
      Inner::Full(data) => f
        .debug_tuple("ResponseBody::Full")
        .field(&String::from_utf8_lossy(data))
        .finish(),
      Inner::Stream(_) => f.write_str("ResponseBody::Stream(..)"),
    }
  }
}

impl Default for ResponseBody {
  fn default() -> Self {
    Self::empty()
  }
}

impl From<()> for ResponseBody {
  fn from(_: ()) -> Self {
    Self::empty()
  }
}

impl From<Vec<u8>> for ResponseBody {
  fn from(data: Vec<u8>) -> Self {
    Self(Inner::Full(data))
  }
}

impl From<String> for ResponseBody {
  fn from(data: String) -> Self {
    Self(Inner::Full(data.into_bytes()))
  }
}

impl From<&'static str> for ResponseBody {
  fn from(data: &'static str) -> Self {
    Self(Inner::Full(data.as_bytes().to_vec()))
  }
}

/// Fully drained [`ResponseBody`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectedBody {
  data: Vec<u8>,
  trailers: HeaderMap,
}

impl CollectedBody {
  /// Body bytes.
  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// Trailing headers (empty if the body had none).
  pub fn trailers(&self) -> &HeaderMap {
    &self.trailers
  }

  /// Split into the body bytes and trailing headers.
  pub fn into_parts(self) -> (Vec<u8>, HeaderMap) {
    (self.data, self.trailers)
  }
}

/// HTTP response whose body has been read into memory, ready to be encoded as a Lambda output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectedResponse {
  status: StatusCode,
  headers: HeaderMap,
  body: Vec<u8>,
}

impl CollectedResponse {
  /// Assemble a collected response from its parts.
  pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Drain the body of `response`. Trailing headers are appended to the response headers.
  pub async fn collect(response: HttpResponse) -> Result<Self, EventError> {
    let (parts, body) = response.into_parts();
    let (data, trailers) = body
      .collect()
      .await
      .map_err(|err| EventError::ResponseBody(err, Backtrace::new()))?
      .into_parts();

    let mut headers = parts.headers;
    for (name, value) in &trailers {
      headers.append(name.clone(), value.clone());
    }

    Ok(Self::new(parts.status, headers, data))
  }

  /// Response status code.
  pub fn status(&self) -> StatusCode {
    self.status
  }

  /// Response headers, including any trailers.
  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  /// Response body bytes.
  pub fn body(&self) -> &[u8] {
    &self.body
  }

  /// Split into status, headers, and body bytes.
  pub fn into_parts(self) -> (StatusCode, HeaderMap, Vec<u8>) {
    (self.status, self.headers, self.body)
  }
}

/// Decode a Lambda event body.
///
/// A missing body is [`Body::Empty`]. A base64-encoded body is decoded to [`Body::Binary`], and
/// anything else is passed through as [`Body::Text`].
pub fn decode_request_body(
  body: Option<&str>,
  is_base64_encoded: bool,
) -> Result<Body, EventError> {
  match body {
    None => Ok(Body::Empty),
    Some(body) if is_base64_encoded => base64::engine::general_purpose::STANDARD
      .decode(body.as_bytes())
      .map(Body::Binary)
      .map_err(|err| EventError::InvalidBodyBase64(Box::new(err), Backtrace::new())),
    Some(body) => Ok(Body::Text(body.to_owned())),
  }
}

/// Whether a `Content-Type` header value denotes a body that is returned as text.
///
/// Parameters such as `charset` are ignored, and the media type is compared without regard to case
/// or surrounding whitespace.
pub fn is_text_content_type(content_type: &str) -> bool {
  let essence = content_type.split(';').next().unwrap_or_default().trim();
  TEXT_CONTENT_TYPES
    .iter()
    .any(|text_type| text_type.essence_str().eq_ignore_ascii_case(essence))
}

/// Response body in the form expected by Lambda outputs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedBody {
  /// Body string, or `None` for an empty body.
  pub body: Option<String>,
  /// Whether `body` holds base64-encoded bytes.
  pub is_base64_encoded: bool,
}

/// Encode collected response bytes for a Lambda output.
///
/// Text content types (see [`is_text_content_type`]) are emitted as-is when the bytes are valid
/// UTF-8. All other bodies are base64-encoded.
pub fn encode_response_body(headers: &HeaderMap, body: Vec<u8>) -> EncodedBody {
  // Triggers read an omitted body as an empty string, whatever the content type.
  if body.is_empty() {
    return EncodedBody::default();
  }

  let is_text = headers
    .get(CONTENT_TYPE)
    .and_then(|content_type| content_type.to_str().ok())
    .map(is_text_content_type)
    .unwrap_or(false);

  let bytes = if is_text {
    match String::from_utf8(body) {
      Ok(text) => {
        return EncodedBody {
          body: Some(text),
          is_base64_encoded: false,
        }
      }
      Err(err) => err.into_bytes(),
    }
  } else {
    body
  };

  EncodedBody {
    body: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
    is_base64_encoded: true,
  }
}
