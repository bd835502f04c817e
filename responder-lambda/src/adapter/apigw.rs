use super::{absolute_uri, build_request, origin_uri, parse_version, EventAdapter, Trigger};
use crate::body::{decode_request_body, encode_response_body, CollectedResponse, EncodedBody};
use crate::header::{fold_headers, take_authority, unfold_headers, FoldedHeaders};
use crate::query::{encode_query, merge_query_params};
use crate::{Config, EventError, HttpRequest};

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::encodings::Body;
use aws_lambda_events::query_map::QueryMap;
use backtrace::Backtrace;
use indexmap::IndexMap;
use itertools::Itertools;

/// Amazon API Gateway REST API trigger (Lambda proxy integration).
///
/// Header and query parameter values are read from both the single-value and multi-value maps of
/// the event, and response headers that occur more than once are returned through
/// `multiValueHeaders`. The `Host` header becomes the authority of the request URI.
#[derive(Debug)]
pub enum ApiGateway {}

// REST APIs URL-decode query parameters before invoking the Lambda function, so the event maps hold
// decoded values that must be re-encoded into the request URI.
fn query_string(single: &QueryMap, multi: &QueryMap) -> String {
  let multi = multi
    .iter()
    .map(|(key, _)| key)
    .unique()
    .filter_map(|key| {
      multi.all(key).map(|values| {
        (
          key.to_owned(),
          values.into_iter().map(str::to_owned).collect::<Vec<_>>(),
        )
      })
    })
    .collect::<IndexMap<_, _>>();

  let single = single
    .iter()
    .map(|(key, _)| key)
    .unique()
    .filter_map(|key| {
      single
        .first(key)
        .map(|value| (key.to_owned(), value.to_owned()))
    })
    .collect::<Vec<_>>();

  encode_query(merge_query_params(single, &multi))
}

impl EventAdapter for ApiGateway {
  type Event = ApiGatewayProxyRequest;
  type Output = ApiGatewayProxyResponse;

  const TRIGGER: Trigger = Trigger::ApiGateway;

  fn decode(event: &Self::Event, config: &Config) -> Result<HttpRequest, EventError> {
    let path = event
      .path
      .as_deref()
      .ok_or_else(|| EventError::MissingPath(Backtrace::new()))?;
    let query = query_string(
      &event.query_string_parameters,
      &event.multi_value_query_string_parameters,
    );

    let mut headers = unfold_headers(&event.headers, &event.multi_value_headers);
    let uri = match take_authority(&mut headers) {
      Some(authority) => {
        let scheme = headers
          .get("x-forwarded-proto")
          .and_then(|proto| proto.to_str().ok())
          .unwrap_or(&config.default_scheme);
        absolute_uri(scheme, &authority, path, Some(&query))?
      }
      None => origin_uri(path, Some(&query))?,
    };

    let body = decode_request_body(event.body.as_deref(), event.is_base64_encoded)?;

    build_request(
      event.http_method.clone(),
      uri,
      parse_version(event.request_context.protocol.as_deref()),
      headers,
      body,
    )
  }

  fn encode(response: CollectedResponse) -> Result<Self::Output, EventError> {
    let (status, headers, body) = response.into_parts();
    let EncodedBody {
      body,
      is_base64_encoded,
    } = encode_response_body(&headers, body);
    let FoldedHeaders { single, multi } = fold_headers(&headers);

    Ok(ApiGatewayProxyResponse {
      status_code: i64::from(status.as_u16()),
      headers: single,
      multi_value_headers: multi,
      body: body.map(Body::Text),
      is_base64_encoded,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::ApiGateway;
  use crate::adapter::EventAdapter;
  use crate::body::CollectedResponse;
  use crate::{Config, EventError, HeaderMap, Method, StatusCode};

  use aws_lambda_events::apigw::ApiGatewayProxyRequest;
  use aws_lambda_events::encodings::Body;
  use http::{HeaderValue, Version};
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn event(overrides: serde_json::Value) -> ApiGatewayProxyRequest {
    let mut event = json!({
      "resource": "/{proxy+}",
      "path": "/pets/1",
      "httpMethod": "GET",
      "headers": {
        "Host": "abc123.execute-api.us-east-1.amazonaws.com",
        "Accept": "text/html",
        "X-Forwarded-Proto": "https"
      },
      "multiValueHeaders": {
        "Host": ["abc123.execute-api.us-east-1.amazonaws.com"],
        "Accept": ["application/json", "text/html"],
        "X-Forwarded-Proto": ["https"]
      },
      "queryStringParameters": null,
      "multiValueQueryStringParameters": null,
      "pathParameters": {"proxy": "pets/1"},
      "stageVariables": null,
      "requestContext": {
        "accountId": "123456789012",
        "resourceId": "abc123",
        "stage": "prod",
        "requestId": "c6af9ac6-7b61-11e6-9a41-93e8deadbeef",
        "identity": {"sourceIp": "127.0.0.1"},
        "resourcePath": "/{proxy+}",
        "httpMethod": "GET",
        "apiId": "abc123",
        "protocol": "HTTP/1.1"
      },
      "body": null,
      "isBase64Encoded": false
    });
    if let (Some(event), Some(overrides)) = (event.as_object_mut(), overrides.as_object()) {
      for (key, value) in overrides {
        event.insert(key.clone(), value.clone());
      }
    }
    serde_json::from_value(event).unwrap()
  }

  #[test]
  fn test_decode() {
    let request = ApiGateway::decode(
      &event(json!({
        "httpMethod": "POST",
        "queryStringParameters": {"foo": "bar2", "q": "a b&c"},
        "multiValueQueryStringParameters": {"foo": ["bar1", "bar2"], "q": ["a b&c"]},
        "body": "aGVsbG8=",
        "isBase64Encoded": true
      })),
      &Config::default(),
    )
    .unwrap();

    assert_eq!(request.method(), Method::POST);
    assert_eq!(request.version(), Version::HTTP_11);
    assert_eq!(
      request.uri().to_string(),
      "https://abc123.execute-api.us-east-1.amazonaws.com/pets/1?foo=bar1&foo=bar2&q=a%20b%26c"
    );
    assert!(!request.headers().contains_key("host"));
    assert_eq!(
      request
        .headers()
        .get_all("accept")
        .iter()
        .collect::<Vec<_>>(),
      vec!["application/json", "text/html"]
    );
    assert_eq!(request.body(), &Body::Binary(b"hello".to_vec()));
  }

  #[test]
  fn test_decode_without_host() {
    let request = ApiGateway::decode(
      &event(json!({
        "headers": {},
        "multiValueHeaders": {"Accept": ["*/*"]}
      })),
      &Config::default(),
    )
    .unwrap();

    assert_eq!(request.uri().to_string(), "/pets/1");
    assert_eq!(request.uri().authority(), None);
    assert_eq!(request.body(), &Body::Empty);
  }

  #[test]
  fn test_decode_default_scheme() {
    let request = ApiGateway::decode(
      &event(json!({
        "headers": {"Host": "localhost:3000"},
        "multiValueHeaders": {}
      })),
      &Config::default().default_scheme("http"),
    )
    .unwrap();

    assert_eq!(request.uri().to_string(), "http://localhost:3000/pets/1");
  }

  #[test]
  fn test_decode_errors() {
    assert!(matches!(
      ApiGateway::decode(&event(json!({"path": null})), &Config::default()),
      Err(EventError::MissingPath(_))
    ));
    assert!(matches!(
      ApiGateway::decode(
        &event(json!({"body": "%%%", "isBase64Encoded": true})),
        &Config::default()
      ),
      Err(EventError::InvalidBodyBase64(_, _))
    ));
  }

  #[test]
  fn test_encode() {
    let mut headers = HeaderMap::new();
    headers.append("set-cookie", HeaderValue::from_static("a=1"));
    headers.append("set-cookie", HeaderValue::from_static("b=2"));
    headers.append(
      "content-type",
      HeaderValue::from_static("text/plain; charset=utf-8"),
    );

    let output = ApiGateway::encode(CollectedResponse::new(
      StatusCode::CREATED,
      headers,
      b"created".to_vec(),
    ))
    .unwrap();

    assert_eq!(output.status_code, 201);
    assert_eq!(output.headers.len(), 1);
    assert_eq!(
      output.headers.get("content-type").unwrap(),
      "text/plain; charset=utf-8"
    );
    assert_eq!(
      output
        .multi_value_headers
        .get_all("set-cookie")
        .iter()
        .collect::<Vec<_>>(),
      vec!["a=1", "b=2"]
    );
    assert!(!output.multi_value_headers.contains_key("content-type"));
    assert_eq!(output.body, Some(Body::Text("created".to_string())));
    assert!(!output.is_base64_encoded);
  }
}
