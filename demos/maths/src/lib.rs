#![warn(missing_docs)]

//! Integer arithmetic served by an AWS Lambda function behind an API Gateway HTTP API.
//!
//! Each operation accepts a `POST` with a JSON body such as `{"lhs": 2, "rhs": 3}` and returns
//! `{"result": 5}`.

use responder_lambda::{
  ApiGatewayV2httpRequest, Body, HeaderValue, HttpError, HttpRequest, HttpResponse, Method,
  RequestContext, ResponderError, StatusCode,
};

use http::header::{ALLOW, CONTENT_TYPE};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request body shared by every operation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operands {
  /// Left-hand operand.
  pub lhs: i64,
  /// Right-hand operand.
  pub rhs: i64,
}

/// Response body.
#[derive(Debug, Serialize)]
pub struct Outcome {
  /// Result of the operation.
  pub result: i64,
}

/// Arithmetic operation selected by the request path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
  /// `POST /add`
  Add,
  /// `POST /subtract`
  Subtract,
  /// `POST /multiply`
  Multiply,
  /// `POST /divide` (integer division, rounding toward zero)
  Divide,
}

impl Operation {
  /// Map a request path (e.g., `/add`) to its operation.
  pub fn from_path(path: &str) -> Option<Self> {
    match path.trim_end_matches('/') {
      "/add" => Some(Operation::Add),
      "/subtract" => Some(Operation::Subtract),
      "/multiply" => Some(Operation::Multiply),
      "/divide" => Some(Operation::Divide),
      _ => None,
    }
  }

  /// Apply the operation, failing instead of overflowing or dividing by zero.
  pub fn apply(self, Operands { lhs, rhs }: Operands) -> Result<i64, MathsError> {
    let result = match self {
      Operation::Add => lhs.checked_add(rhs),
      Operation::Subtract => lhs.checked_sub(rhs),
      Operation::Multiply => lhs.checked_mul(rhs),
      Operation::Divide if rhs == 0 => return Err(MathsError::DivisionByZero),
      Operation::Divide => lhs.checked_div(rhs),
    };
    result.ok_or(MathsError::Overflow)
  }
}

/// Error caused by the request. Converts into a 400 Bad Request [`HttpError`].
#[derive(Debug, Error)]
pub enum MathsError {
  /// `/divide` with `rhs` of zero.
  #[error("division by zero")]
  DivisionByZero,
  /// Request body isn't a valid [`Operands`] JSON object.
  #[error("invalid request body")]
  InvalidBody(#[source] serde_path_to_error::Error<serde_json::Error>),
  /// Result doesn't fit in an `i64`.
  #[error("result is out of range")]
  Overflow,
}

// Every failure here is caused by the request, so all of them map to 400 Bad Request.
impl From<MathsError> for HttpError {
  fn from(err: MathsError) -> Self {
    let message = match &err {
      MathsError::InvalidBody(inner) => {
        format!("Invalid request body at `{}`: {}", inner.path(), inner.inner())
      }
      MathsError::DivisionByZero | MathsError::Overflow => err.to_string(),
    };
    HttpError::with_message(StatusCode::BAD_REQUEST, message)
  }
}

fn parse_operands(body: &Body) -> Result<Operands, MathsError> {
  let bytes: &[u8] = match body {
    Body::Empty => &[],
    Body::Text(text) => text.as_bytes(),
    Body::Binary(bytes) => bytes,
  };
  serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(bytes))
    .map_err(MathsError::InvalidBody)
}

fn json_response<T: Serialize>(value: &T) -> Result<HttpResponse, ResponderError> {
  let body = serde_json::to_vec(value).map_err(|err| ResponderError::Other(err.into()))?;
  let mut response = HttpResponse::new(body.into());
  response.headers_mut().insert(
    CONTENT_TYPE,
    HeaderValue::from_static("application/json; charset=utf-8"),
  );
  Ok(response)
}

/// Responder for every route. Pass to [`responder_fn`](responder_lambda::responder_fn).
pub async fn respond(
  request: HttpRequest,
  _context: RequestContext<ApiGatewayV2httpRequest>,
) -> Result<HttpResponse, ResponderError> {
  let Some(operation) = Operation::from_path(request.uri().path()) else {
    return Err(HttpError::new(StatusCode::NOT_FOUND).into());
  };
  if request.method() != Method::POST {
    return Err(
      HttpError::new(StatusCode::METHOD_NOT_ALLOWED)
        .header(ALLOW, HeaderValue::from_static("POST"))
        .into(),
    );
  }

  let operands = parse_operands(request.body()).map_err(HttpError::from)?;
  let (lhs, rhs) = (operands.lhs, operands.rhs);
  let result = operation.apply(operands).map_err(HttpError::from)?;
  info!("{operation:?}({lhs}, {rhs}) = {result}");

  json_response(&Outcome { result })
}

#[cfg(test)]
mod tests {
  use super::{MathsError, Operands, Operation};

  use pretty_assertions::assert_eq;

  fn apply(operation: Operation, lhs: i64, rhs: i64) -> Result<i64, MathsError> {
    operation.apply(Operands { lhs, rhs })
  }

  #[test]
  fn test_from_path() {
    assert_eq!(Operation::from_path("/add"), Some(Operation::Add));
    assert_eq!(Operation::from_path("/divide/"), Some(Operation::Divide));
    assert_eq!(Operation::from_path("/modulo"), None);
  }

  #[test]
  fn test_apply() {
    assert_eq!(apply(Operation::Add, 2, 3).unwrap(), 5);
    assert_eq!(apply(Operation::Subtract, 2, 3).unwrap(), -1);
    assert_eq!(apply(Operation::Multiply, -4, 3).unwrap(), -12);
    assert_eq!(apply(Operation::Divide, 7, 2).unwrap(), 3);
    assert!(matches!(
      apply(Operation::Divide, 1, 0),
      Err(MathsError::DivisionByZero)
    ));
    assert!(matches!(
      apply(Operation::Add, i64::MAX, 1),
      Err(MathsError::Overflow)
    ));
    assert!(matches!(
      apply(Operation::Divide, i64::MIN, -1),
      Err(MathsError::Overflow)
    ));
  }
}
