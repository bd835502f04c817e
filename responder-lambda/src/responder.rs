use crate::{
  BoxError, HeaderMap, HeaderName, HeaderValue, HttpRequest, HttpResponse, LambdaContext,
  ResponseBody, StatusCode,
};

use async_trait::async_trait;
use headers::{ContentLength, ContentType, HeaderMapExt};
use http::header::CONTENT_TYPE;
use thiserror::Error;

use std::future::Future;

/// HTTP request handler run by a [`LambdaFunction`](crate::LambdaFunction).
///
/// The responder is constructed once when the Lambda function starts and is shared by every
/// invocation, so any mutable state must be synchronized. `E` is the trigger event that produced
/// the request (e.g., [`ApiGatewayV2httpRequest`](crate::ApiGatewayV2httpRequest)).
///
/// This trait is intended to be used with the [`#[async_trait]`](async_trait::async_trait)
/// attribute.
///
/// # Example
///
/// ```rust
/// use responder_lambda::async_trait::async_trait;
/// use responder_lambda::{
///   ApiGatewayV2httpRequest, HttpError, HttpRequest, HttpResponse, RequestContext, Responder,
///   ResponderError, StatusCode,
/// };
///
/// struct Hello;
///
/// #[async_trait]
/// impl Responder<ApiGatewayV2httpRequest> for Hello {
///   async fn respond(
///     &self,
///     request: HttpRequest,
///     _context: RequestContext<ApiGatewayV2httpRequest>,
///   ) -> Result<HttpResponse, ResponderError> {
///     if request.uri().path() != "/hello" {
///       return Err(HttpError::new(StatusCode::NOT_FOUND).into());
///     }
///     Ok(HttpResponse::new("Hello, world!".into()))
///   }
/// }
/// ```
#[async_trait]
pub trait Responder<E>: Send + Sync
where
  E: Send + Sync + 'static,
{
  /// Produce a response for a single request.
  ///
  /// Returning [`ResponderError::Http`] sends the error's status, headers, and message to the
  /// client. Any other error fails the Lambda invocation.
  async fn respond(
    &self,
    request: HttpRequest,
    context: RequestContext<E>,
  ) -> Result<HttpResponse, ResponderError>;

  /// Release any resources held by the responder. Called at most once, when the Lambda function
  /// shuts down.
  async fn shutdown(&self) -> Result<(), BoxError> {
    Ok(())
  }
}

/// Trigger event and Lambda invocation context accompanying an [`HttpRequest`].
#[derive(Debug)]
pub struct RequestContext<E> {
  event: E,
  lambda_context: LambdaContext,
}

impl<E> RequestContext<E> {
  /// Create a request context.
  pub fn new(event: E, lambda_context: LambdaContext) -> Self {
    Self {
      event,
      lambda_context,
    }
  }

  /// Raw trigger event (e.g., for reading the API Gateway authorizer claims).
  pub fn event(&self) -> &E {
    &self.event
  }

  /// Lambda function execution context.
  pub fn lambda_context(&self) -> &LambdaContext {
    &self.lambda_context
  }

  /// Split into the trigger event and Lambda context.
  pub fn into_parts(self) -> (E, LambdaContext) {
    (self.event, self.lambda_context)
  }
}

/// [`Responder`] backed by an async function. See [`responder_fn`].
#[derive(Clone, Copy, Debug)]
pub struct ResponderFn<F>(F);

/// Use an async function or closure as a [`Responder`].
///
/// ```rust
/// use responder_lambda::{
///   responder_fn, ApiGatewayV2httpRequest, HttpRequest, HttpResponse, RequestContext,
///   ResponderError,
/// };
///
/// let responder = responder_fn(
///   |_request: HttpRequest, _context: RequestContext<ApiGatewayV2httpRequest>| async move {
///     Ok::<_, ResponderError>(HttpResponse::new("pong".into()))
///   },
/// );
/// ```
pub fn responder_fn<F>(f: F) -> ResponderFn<F> {
  ResponderFn(f)
}

#[async_trait]
impl<E, F, Fut> Responder<E> for ResponderFn<F>
where
  E: Send + Sync + 'static,
  F: Fn(HttpRequest, RequestContext<E>) -> Fut + Send + Sync,
  Fut: Future<Output = Result<HttpResponse, ResponderError>> + Send,
{
  async fn respond(
    &self,
    request: HttpRequest,
    context: RequestContext<E>,
  ) -> Result<HttpResponse, ResponderError> {
    (self.0)(request, context).await
  }
}

/// Error that should be returned to the client as an HTTP response.
#[derive(Clone, Debug, Error)]
#[error("HTTP error {status}")]
pub struct HttpError {
  status: StatusCode,
  headers: HeaderMap,
  message: Option<String>,
}

impl HttpError {
  /// Error with the given status and no response body.
  pub fn new(status: StatusCode) -> Self {
    Self {
      status,
      headers: HeaderMap::new(),
      message: None,
    }
  }

  /// Error with the given status and a plain-text message as the response body.
  pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
    Self {
      message: Some(message.into()),
      ..Self::new(status)
    }
  }

  /// Append a response header.
  pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.append(name, value);
    self
  }

  /// Response status code.
  pub fn status(&self) -> StatusCode {
    self.status
  }

  /// Response headers.
  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  /// Response message, if any.
  pub fn message(&self) -> Option<&str> {
    self.message.as_deref()
  }

  /// Convert the error into the response sent to the client.
  ///
  /// A message becomes the UTF-8 response body, with `Content-Length` set to its length in bytes
  /// and `Content-Type: text/plain; charset=utf-8` unless a content type is already present.
  pub fn into_response(self) -> HttpResponse {
    let mut headers = self.headers;
    let body = match self.message {
      Some(message) => {
        headers.typed_insert(ContentLength(message.len() as u64));
        if !headers.contains_key(CONTENT_TYPE) {
          headers.typed_insert(ContentType::text_utf8());
        }
        ResponseBody::from(message)
      }
      None => ResponseBody::empty(),
    };

    let mut response = HttpResponse::new(body);
    *response.status_mut() = self.status;
    *response.headers_mut() = headers;
    response
  }
}

/// Error returned by [`Responder::respond`].
#[derive(Debug, Error)]
pub enum ResponderError {
  /// Error to be returned to the client as an HTTP response.
  #[error(transparent)]
  Http(#[from] HttpError),
  /// Any other failure. This fails the Lambda invocation.
  #[error("responder failed")]
  Other(#[source] BoxError),
}

impl From<anyhow::Error> for ResponderError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<HttpError>() {
      Ok(http_err) => ResponderError::Http(http_err),
      Err(err) => ResponderError::Other(err.into()),
    }
  }
}

impl From<BoxError> for ResponderError {
  fn from(err: BoxError) -> Self {
    match err.downcast::<HttpError>() {
      Ok(http_err) => ResponderError::Http(*http_err),
      Err(err) => ResponderError::Other(err),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{HttpError, ResponderError};
  use crate::{BoxError, HeaderValue, StatusCode};

  use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
  use pretty_assertions::assert_eq;

  #[tokio::test]
  async fn test_http_error_into_response() {
    let response = HttpError::with_message(StatusCode::BAD_REQUEST, "BadRequest").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers().get(CONTENT_LENGTH).unwrap(), "10");
    assert_eq!(
      response.headers().get(CONTENT_TYPE).unwrap(),
      "text/plain; charset=utf-8"
    );

    let body = response.into_body().collect().await.unwrap();
    assert_eq!(body.data(), b"BadRequest");
  }

  #[tokio::test]
  async fn test_http_error_keeps_headers() {
    let response = HttpError::with_message(StatusCode::CONFLICT, "{\"error\":\"conflict\"}")
      .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
      .header(CONTENT_LENGTH, HeaderValue::from_static("1"))
      .into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
      response.headers().get(CONTENT_TYPE).unwrap(),
      "application/json"
    );
    assert_eq!(
      response
        .headers()
        .get_all(CONTENT_LENGTH)
        .iter()
        .collect::<Vec<_>>(),
      vec!["20"]
    );

    let response = HttpError::new(StatusCode::NO_CONTENT).into_response();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().is_empty());
    assert!(response.into_body().collect().await.unwrap().data().is_empty());
  }

  #[test]
  fn test_responder_error_conversions() {
    let err = ResponderError::from(anyhow::Error::new(HttpError::new(StatusCode::NOT_FOUND)));
    assert!(matches!(
      err,
      ResponderError::Http(ref http_err) if http_err.status() == StatusCode::NOT_FOUND
    ));

    let err = ResponderError::from(anyhow::anyhow!("database unavailable"));
    assert!(matches!(err, ResponderError::Other(_)));

    let boxed: BoxError = Box::new(HttpError::new(StatusCode::UNAUTHORIZED));
    assert!(matches!(ResponderError::from(boxed), ResponderError::Http(_)));

    let boxed: BoxError = "boom".into();
    assert!(matches!(ResponderError::from(boxed), ResponderError::Other(_)));
  }
}
