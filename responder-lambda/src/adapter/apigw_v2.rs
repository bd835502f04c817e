use super::{
  append_cookies, build_request, encode_single_value, origin_uri, parse_version, EventAdapter,
  SingleValueOutput, Trigger,
};
use crate::body::{decode_request_body, CollectedResponse};
use crate::header::split_comma_joined;
use crate::{Config, EventError, HeaderMap, HttpRequest};

use aws_lambda_events::apigw::{ApiGatewayV2httpRequest, ApiGatewayV2httpResponse};
use aws_lambda_events::encodings::Body;
use backtrace::Backtrace;

/// Amazon API Gateway HTTP API trigger (payload format version 2.0).
///
/// The request path is taken from the route key (e.g., `POST /add`) since the raw path includes
/// the stage name. Repeated headers arrive comma-joined and are split into separate values.
#[derive(Debug)]
pub enum ApiGatewayV2 {}

/// Extract the path from a `METHOD path` route key.
pub(crate) fn route_key_path(route_key: Option<&str>) -> Result<&str, EventError> {
  let route_key = route_key.ok_or_else(|| EventError::MissingRouteKey(Backtrace::new()))?;
  route_key
    .split_once(' ')
    .map(|(_, path)| path)
    .ok_or_else(|| EventError::MalformedRouteKey(route_key.to_owned(), Backtrace::new()))
}

impl EventAdapter for ApiGatewayV2 {
  type Event = ApiGatewayV2httpRequest;
  type Output = ApiGatewayV2httpResponse;

  const TRIGGER: Trigger = Trigger::ApiGatewayV2;

  fn decode(event: &Self::Event, _config: &Config) -> Result<HttpRequest, EventError> {
    let path = route_key_path(event.route_key.as_deref())?;
    let uri = origin_uri(path, event.raw_query_string.as_deref())?;

    let mut headers = split_comma_joined(&event.headers)?;
    append_cookies(&mut headers, event.cookies.as_deref())?;

    let body = decode_request_body(event.body.as_deref(), event.is_base64_encoded)?;

    build_request(
      event.request_context.http.method.clone(),
      uri,
      parse_version(event.request_context.http.protocol.as_deref()),
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

    Ok(ApiGatewayV2httpResponse {
      status_code,
      headers,
      multi_value_headers: HeaderMap::new(),
      body: body.body.map(Body::Text),
      is_base64_encoded: body.is_base64_encoded,
      cookies,
    })
  }
}
