#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

// These are documented public exports since responders and the event adapters depend on them.
pub use async_trait;
pub use aws_lambda_events::apigw::{
  ApiGatewayProxyRequest, ApiGatewayProxyResponse, ApiGatewayV2httpRequest,
  ApiGatewayV2httpResponse,
};
pub use aws_lambda_events::encodings::Body;
pub use aws_lambda_events::lambda_function_urls::{
  LambdaFunctionUrlRequest, LambdaFunctionUrlResponse,
};
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
pub use lambda_runtime::{Context as LambdaContext, LambdaEvent};

/// Conversions between trigger events and HTTP requests/responses.
pub mod adapter;

pub use adapter::{ApiGateway, ApiGatewayV2, EventAdapter, FunctionUrl, Trigger};

/// Request and response body handling.
pub mod body;

pub use body::{CollectedBody, CollectedResponse, Frame, ResponseBody};

mod config;

pub use config::{Config, EventErrorPolicy};

/// Error handling.
pub mod error;

pub use error::{EventError, InvocationError};

mod function;

pub use function::{
  ApiGatewayLambda, ApiGatewayV2Lambda, FunctionUrlLambda, LambdaFunction, Service,
};

/// Conversions between HTTP header maps and the single-/multi-value maps used by Lambda events.
pub mod header;

/// Query string encoding and decoding.
pub mod query;

mod responder;

pub use responder::{
  responder_fn, HttpError, RequestContext, Responder, ResponderError, ResponderFn,
};

/// HTTP request passed to a [`Responder`].
pub type HttpRequest = Request<Body>;

/// HTTP response returned by a [`Responder`].
pub type HttpResponse = Response<ResponseBody>;

/// Type-erased error used at the boundaries with responders and the Lambda runtime.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
