use crate::body::{encode_response_body, CollectedResponse, EncodedBody};
use crate::header::{extract_set_cookies, fold_headers, FoldedHeaders};
use crate::{Config, EventError, HeaderMap, HttpRequest, Method};

use aws_lambda_events::encodings::Body;
use backtrace::Backtrace;
use http::header::HOST;
use http::uri::Uri;
use http::{HeaderValue, Request, Version};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;

use std::fmt::{Debug, Display, Formatter};

mod apigw;
mod apigw_v2;
mod function_url;

pub use apigw::ApiGateway;
pub use apigw_v2::ApiGatewayV2;
pub use function_url::FunctionUrl;

// Characters that can't appear literally in a URI path. `%` is left alone so that paths that are
// already percent-encoded pass through unchanged.
const PATH_UNSAFE: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'#')
  .add(b'<')
  .add(b'>')
  .add(b'`')
  .add(b'{')
  .add(b'}');

/// AWS service that invoked the Lambda function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
  /// Amazon API Gateway REST API (proxy integration, payload format 1.0).
  ApiGateway,
  /// Amazon API Gateway HTTP API (payload format 2.0).
  ApiGatewayV2,
  /// Lambda function URL.
  FunctionUrl,
}

impl Display for Trigger {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Trigger::ApiGateway => "API Gateway REST API",
      Trigger::ApiGatewayV2 => "API Gateway HTTP API",
      Trigger::FunctionUrl => "Lambda Function URL",
    })
  }
}

/// Conversion between one trigger's event/output types and HTTP requests/responses.
///
/// Implemented by the uninhabited marker types [`ApiGateway`], [`ApiGatewayV2`], and
/// [`FunctionUrl`], which select the trigger of a [`LambdaFunction`](crate::LambdaFunction) at
/// compile time.
pub trait EventAdapter {
  /// Event payload received from the Lambda runtime.
  type Event: DeserializeOwned + Debug + Send + Sync + 'static;
  /// Output payload returned to the Lambda runtime.
  type Output: Serialize + Debug + Send + 'static;

  /// Trigger handled by this adapter.
  const TRIGGER: Trigger;

  /// Convert an event into the HTTP request passed to the responder.
  fn decode(event: &Self::Event, config: &Config) -> Result<HttpRequest, EventError>;

  /// Convert a collected HTTP response into the trigger's output format.
  fn encode(response: CollectedResponse) -> Result<Self::Output, EventError>;
}

/// Parse the `protocol` field of an event's request context (e.g., `HTTP/1.1`).
pub(crate) fn parse_version(protocol: Option<&str>) -> Version {
  match protocol.map(str::to_ascii_uppercase).as_deref() {
    Some("HTTP/0.9") => Version::HTTP_09,
    Some("HTTP/1.0") => Version::HTTP_10,
    Some("HTTP/2") | Some("HTTP/2.0") => Version::HTTP_2,
    Some("HTTP/3") | Some("HTTP/3.0") => Version::HTTP_3,
    _ => Version::HTTP_11,
  }
}

/// Join a raw path and an already-encoded query string into a URI path-and-query.
fn path_and_query(path: &str, query: Option<&str>) -> String {
  let path = utf8_percent_encode(path, PATH_UNSAFE).to_string();
  let path = if path.starts_with('/') {
    path
  } else {
    format!("/{path}")
  };
  match query {
    Some(query) if !query.is_empty() => format!("{path}?{query}"),
    _ => path,
  }
}

/// Build an origin-form request URI (path and query only).
pub(crate) fn origin_uri(path: &str, query: Option<&str>) -> Result<Uri, EventError> {
  let path_and_query = path_and_query(path, query);
  Uri::builder()
    .path_and_query(path_and_query.as_str())
    .build()
    .map_err(|err| EventError::InvalidRequestUri(path_and_query, Box::new(err), Backtrace::new()))
}

/// Build an absolute request URI whose authority comes from a `Host` header.
pub(crate) fn absolute_uri(
  scheme: &str,
  authority: &HeaderValue,
  path: &str,
  query: Option<&str>,
) -> Result<Uri, EventError> {
  let authority = authority.to_str().map_err(|err| {
    EventError::InvalidHeaderValue(HOST, Box::new(err), Backtrace::new())
  })?;
  let path_and_query = path_and_query(path, query);
  Uri::builder()
    .scheme(scheme)
    .authority(authority)
    .path_and_query(path_and_query.as_str())
    .build()
    .map_err(|err| {
      EventError::InvalidRequestUri(
        format!("{scheme}://{authority}{path_and_query}"),
        Box::new(err),
        Backtrace::new(),
      )
    })
}

/// Assemble the HTTP request handed to the responder.
pub(crate) fn build_request(
  method: Method,
  uri: Uri,
  version: Version,
  headers: HeaderMap,
  body: Body,
) -> Result<HttpRequest, EventError> {
  let mut request = Request::builder()
    .method(method)
    .uri(uri)
    .version(version)
    .body(body)
    .map_err(|err| EventError::HttpRequest(Box::new(err), Backtrace::new()))?;
  *request.headers_mut() = headers;
  Ok(request)
}

/// Join the `cookies` array of an API Gateway HTTP API or Function URL event into one `Cookie`
/// header.
pub(crate) fn append_cookies(
  headers: &mut HeaderMap,
  cookies: Option<&[String]>,
) -> Result<(), EventError> {
  match cookies {
    Some(cookies) if !cookies.is_empty() => {
      let cookie = HeaderValue::try_from(cookies.join("; ")).map_err(|err| {
        EventError::InvalidHeaderValue(http::header::COOKIE, Box::new(err), Backtrace::new())
      })?;
      headers.append(http::header::COOKIE, cookie);
      Ok(())
    }
    _ => Ok(()),
  }
}

/// Response fields shared by the outputs of triggers without multi-value header support.
pub(crate) struct SingleValueOutput {
  pub status_code: i64,
  pub headers: HeaderMap,
  pub body: EncodedBody,
  pub cookies: Vec<String>,
}

/// Encode a response for a trigger whose output carries cookies separately and has no
/// multi-value headers.
///
/// `Set-Cookie` headers move into `cookies`. Any other header with several values fails with
/// [`EventError::UnsupportedMultiValueHeader`] rather than being joined or dropped.
pub(crate) fn encode_single_value(
  response: CollectedResponse,
  trigger: Trigger,
) -> Result<SingleValueOutput, EventError> {
  let (status, mut headers, body) = response.into_parts();
  let cookies = extract_set_cookies(&mut headers)?;

  let FoldedHeaders { single, multi } = fold_headers(&headers);
  if let Some(header_name) = multi.keys().next() {
    return Err(EventError::UnsupportedMultiValueHeader {
      trigger,
      header_name: header_name.clone(),
      backtrace: Backtrace::new(),
    });
  }

  Ok(SingleValueOutput {
    status_code: i64::from(status.as_u16()),
    body: encode_response_body(&single, body),
    headers: single,
    cookies,
  })
}
