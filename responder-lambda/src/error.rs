use crate::adapter::Trigger;
use crate::{BoxError, HeaderName, HttpResponse, ResponseBody, StatusCode};

// Until std::error::Backtrace is fully stabilized, we can't embed a type named `Backtrace` within
// a thiserror::Error (see https://github.com/dtolnay/thiserror/issues/204).
use backtrace::Backtrace as _Backtrace;
use headers::{ContentType, HeaderMapExt};
use itertools::Itertools;
use log::error;
use thiserror::Error;

/// Error that occurred while converting between a Lambda event and an HTTP request or response.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
  /// Failed to assemble the HTTP request.
  #[error("failed to prepare HTTP request")]
  HttpRequest(#[source] Box<http::Error>, _Backtrace),
  /// Invalid base64 encoding for request body.
  #[error("invalid base64 encoding for request body")]
  InvalidBodyBase64(#[source] Box<base64::DecodeError>, _Backtrace),
  /// Request header value could not be represented as an HTTP header.
  #[error("invalid value for request header `{0}`")]
  InvalidHeaderValue(HeaderName, #[source] BoxError, _Backtrace),
  /// Unrecognized or missing HTTP method.
  #[error("unrecognized HTTP method `{0}`")]
  InvalidMethod(String, _Backtrace),
  /// Request path and query do not form a valid URI.
  #[error("invalid request URI `{0}`")]
  InvalidRequestUri(String, #[source] Box<http::Error>, _Backtrace),
  /// `Set-Cookie` response header is not valid UTF-8.
  #[error("invalid UTF-8 encoding for `Set-Cookie` response header")]
  InvalidSetCookie(#[source] BoxError, _Backtrace),
  /// Route key does not contain a `METHOD path` pair.
  #[error("malformed route key `{0}`")]
  MalformedRouteKey(String, _Backtrace),
  /// Event does not specify a request path.
  #[error("missing request path")]
  MissingPath(_Backtrace),
  /// Event does not specify a route key.
  #[error("missing route key")]
  MissingRouteKey(_Backtrace),
  /// Failed to read the response body.
  #[error("failed to read response body")]
  ResponseBody(#[source] BoxError, _Backtrace),
  /// Response contains a repeated header that the trigger's output format cannot represent.
  #[error("multi-value header `{header_name}` is not supported by {trigger} responses")]
  UnsupportedMultiValueHeader {
    /// Trigger whose output format lacks multi-value headers.
    trigger: Trigger,
    /// Name of the repeated header.
    header_name: HeaderName,
    /// Stack trace indicating where the error occurred.
    backtrace: _Backtrace,
  },
}

impl EventError {
  /// Return the backtrace associated with the error, if known.
  pub fn backtrace(&self) -> Option<&_Backtrace> {
    match self {
      EventError::HttpRequest(_, backtrace)
      | EventError::InvalidBodyBase64(_, backtrace)
      | EventError::InvalidHeaderValue(_, _, backtrace)
      | EventError::InvalidMethod(_, backtrace)
      | EventError::InvalidRequestUri(_, _, backtrace)
      | EventError::InvalidSetCookie(_, backtrace)
      | EventError::MalformedRouteKey(_, backtrace)
      | EventError::MissingPath(backtrace)
      | EventError::MissingRouteKey(backtrace)
      | EventError::ResponseBody(_, backtrace)
      | EventError::UnsupportedMultiValueHeader { backtrace, .. } => Some(backtrace),
    }
  }

  /// Return the name of the error variant (e.g., `InvalidBodyBase64`).
  pub fn name(&self) -> &str {
    match self {
      EventError::HttpRequest(_, _) => "HttpRequest",
      EventError::InvalidBodyBase64(_, _) => "InvalidBodyBase64",
      EventError::InvalidHeaderValue(_, _, _) => "InvalidHeaderValue",
      EventError::InvalidMethod(_, _) => "InvalidMethod",
      EventError::InvalidRequestUri(_, _, _) => "InvalidRequestUri",
      EventError::InvalidSetCookie(_, _) => "InvalidSetCookie",
      EventError::MalformedRouteKey(_, _) => "MalformedRouteKey",
      EventError::MissingPath(_) => "MissingPath",
      EventError::MissingRouteKey(_) => "MissingRouteKey",
      EventError::ResponseBody(_, _) => "ResponseBody",
      EventError::UnsupportedMultiValueHeader { .. } => "UnsupportedMultiValueHeader",
    }
  }

  /// Whether the error was caused by the data the client sent (as opposed to a malformed event or
  /// a response this crate cannot encode).
  pub fn is_client_error(&self) -> bool {
    matches!(
      self,
      EventError::InvalidBodyBase64(_, _)
        | EventError::InvalidHeaderValue(_, _, _)
        | EventError::InvalidMethod(_, _)
        | EventError::InvalidRequestUri(_, _, _)
    )
  }
}

impl From<EventError> for HttpResponse {
  /// Build a client-facing [`HttpResponse`] appropriate for the error that occurred.
  ///
  /// Client errors (see [`EventError::is_client_error`]) produce a 400 Bad Request with a
  /// human-readable `text/plain` body. All other errors produce a 500 Internal Server Error without
  /// a response body.
  fn from(err: EventError) -> HttpResponse {
    let (status_code, body) = match err {
      // 400
      EventError::InvalidBodyBase64(_, _) => (
        StatusCode::BAD_REQUEST,
        Some("Request body must be base64 encoded".to_string()),
      ),
      EventError::InvalidHeaderValue(header_name, _, _) => (
        StatusCode::BAD_REQUEST,
        Some(format!("Invalid value for header `{header_name}`")),
      ),
      EventError::InvalidMethod(method, _) => (
        StatusCode::BAD_REQUEST,
        Some(format!("Unrecognized HTTP method `{method}`")),
      ),
      EventError::InvalidRequestUri(uri, _, _) => (
        StatusCode::BAD_REQUEST,
        Some(format!("Invalid request URI `{uri}`")),
      ),
      // 500
      EventError::HttpRequest(_, _)
      | EventError::InvalidSetCookie(_, _)
      | EventError::MalformedRouteKey(_, _)
      | EventError::MissingPath(_)
      | EventError::MissingRouteKey(_)
      | EventError::ResponseBody(_, _)
      | EventError::UnsupportedMultiValueHeader { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    let mut response = if let Some(body_str) = body {
      error!("Responding with error status {status_code}: {body_str}");

      let mut response = HttpResponse::new(ResponseBody::from(body_str));
      response
        .headers_mut()
        .typed_insert(ContentType::text_utf8());

      response
    } else {
      error!("Responding with error status {status_code}");

      HttpResponse::new(ResponseBody::empty())
    };

    *response.status_mut() = status_code;

    response
  }
}

/// Error that failed a Lambda invocation.
///
/// The Lambda runtime reports these to the platform as invocation failures. Errors raised by the
/// responder as [`HttpError`](crate::HttpError) never end up here since they are converted into
/// ordinary HTTP responses.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InvocationError {
  /// Failed to convert the trigger event into an HTTP request.
  #[error("failed to decode {0} event")]
  Decode(Trigger, #[source] EventError),
  /// Failed to convert the HTTP response into the trigger's output format.
  #[error("failed to encode {0} response")]
  Encode(Trigger, #[source] EventError),
  /// Responder panicked while handling the request.
  #[error("responder panicked: {0}")]
  Panic(String),
  /// Responder failed with an error other than an HTTP error.
  #[error("responder failed")]
  Responder(#[source] BoxError),
}

impl InvocationError {
  /// Return the backtrace associated with the underlying [`EventError`], if any.
  pub fn backtrace(&self) -> Option<&_Backtrace> {
    match self {
      InvocationError::Decode(_, err) | InvocationError::Encode(_, err) => err.backtrace(),
      InvocationError::Panic(_) | InvocationError::Responder(_) => None,
    }
  }

  /// Return the name of the error variant, including the underlying [`EventError`] variant (e.g.,
  /// `Decode(InvalidBodyBase64)`).
  pub fn name(&self) -> String {
    match self {
      InvocationError::Decode(_, err) => format!("Decode({})", err.name()),
      InvocationError::Encode(_, err) => format!("Encode({})", err.name()),
      InvocationError::Panic(_) => "Panic".to_string(),
      InvocationError::Responder(_) => "Responder".to_string(),
    }
  }
}

/// Helper function for formatting an error as a string containing a human-readable chain of causes.
///
/// This function will walk over the chain of causes returned by
/// [`Error::source`](std::error::Error::source) and append each underlying error (using the
/// [`Display`](std::fmt::Display) trait).
///
/// # Arguments
///
/// * `err` - Error to format.
/// * `name` - Optional name of the error type/variant (e.g., `EventError::InvalidBodyBase64`).
/// * `backtrace` - Optional [`Backtrace`](backtrace::Backtrace) indicating where the top-level
///   error occurred.
pub fn format_error(
  err: &(dyn std::error::Error),
  name: Option<&str>,
  backtrace: Option<&_Backtrace>,
) -> String {
  let err_line = name
    .map(|n| format!("{}: {}", n, err))
    .unwrap_or_else(|| err.to_string());

  let top_error = if let Some(bt) = backtrace {
    format!("{err_line}\n  stack trace:\n{}", format_backtrace(bt, 4))
  } else {
    err_line
  };

  let cause_str = ErrorCauseIterator(err.source())
    .map(|cause| format!("  caused by: {cause}"))
    .join("\n");

  if !cause_str.is_empty() {
    format!("{top_error}\n{cause_str}")
  } else {
    top_error
  }
}

struct ErrorCauseIterator<'a>(Option<&'a (dyn std::error::Error + 'static)>);

impl<'a> Iterator for ErrorCauseIterator<'a> {
  type Item = &'a (dyn std::error::Error + 'static);

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.0;
    self.0 = current.and_then(|err| err.source());
    current
  }
}

fn format_backtrace(backtrace: &_Backtrace, indent: usize) -> String {
  let indent_str = " ".repeat(indent);
  format!("{backtrace:?}")
    .lines()
    .map(|line| format!("{indent_str}{line}"))
    .join("\n")
}
