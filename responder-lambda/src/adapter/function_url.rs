use super::{
  append_cookies, build_request, encode_single_value, origin_uri, parse_version, EventAdapter,
  SingleValueOutput, Trigger,
};
use crate::body::{decode_request_body, CollectedResponse};
use crate::header::split_comma_joined;
use crate::{Config, EventError, HttpRequest, Method};

use aws_lambda_events::lambda_function_urls::{LambdaFunctionUrlRequest, LambdaFunctionUrlResponse};
use backtrace::Backtrace;

/// Lambda function URL trigger.
///
/// Events use the same layout as API Gateway HTTP API events, except that the method and path come
/// from `requestContext.http`.
#[derive(Debug)]
pub enum FunctionUrl {}

fn parse_method(method: Option<&str>) -> Result<Method, EventError> {
  let method = method.unwrap_or_default();
  Method::from_bytes(method.as_bytes())
    .map_err(|_| EventError::InvalidMethod(method.to_owned(), Backtrace::new()))
}

impl EventAdapter for FunctionUrl {
  type Event = LambdaFunctionUrlRequest;
  type Output = LambdaFunctionUrlResponse;

  const TRIGGER: Trigger = Trigger::FunctionUrl;

  fn decode(event: &Self::Event, _config: &Config) -> Result<HttpRequest, EventError> {
    let http = &event.request_context.http;
    let method = parse_method(http.method.as_deref())?;
    let path = http
      .path
      .as_deref()
      .ok_or_else(|| EventError::MissingPath(Backtrace::new()))?;
    let uri = origin_uri(path, event.raw_query_string.as_deref())?;

    let mut headers = split_comma_joined(&event.headers)?;
    append_cookies(&mut headers, event.cookies.as_deref())?;

    let body = decode_request_body(event.body.as_deref(), event.is_base64_encoded)?;

    build_request(
      method,
      uri,
      parse_version(http.protocol.as_deref()),
      headers,
      body,
    )
  }

  fn encode(response: CollectedResponse) -> Result<Self::Output, EventError> {
    let SingleValueOutput {
      status_code,
      headers,
      body,
      cookies,
    } = encode_single_value(response, Self::TRIGGER)?;

    Ok(LambdaFunctionUrlResponse {
      status_code,
      headers,
      body: body.body,
      is_base64_encoded: body.is_base64_encoded,
      cookies,
    })
  }
}
