use crate::adapter::{ApiGateway, ApiGatewayV2, EventAdapter, FunctionUrl};
use crate::body::CollectedResponse;
use crate::config::{Config, EventErrorPolicy};
use crate::error::{format_error, InvocationError};
use crate::responder::{RequestContext, Responder, ResponderError};
use crate::{BoxError, HttpResponse, LambdaContext};

use async_trait::async_trait;
use futures::FutureExt;
use lambda_runtime::{service_fn, LambdaEvent};
use log::{debug, error, info, trace};

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

/// Background task that runs alongside the Lambda runtime, such as a connection pool refresher or
/// a telemetry flusher.
///
/// Attached with [`LambdaFunction::with_service`]. If any service returns from [`run`](Self::run),
/// the Lambda function stops and every service is shut down with the responder.
#[async_trait]
pub trait Service: Send + Sync {
  /// Name used in log messages.
  fn name(&self) -> &str;

  /// Run the service until it finishes or fails.
  async fn run(&self) -> Result<(), BoxError>;

  /// Release the service's resources. Called at most once.
  async fn shutdown(&self) -> Result<(), BoxError> {
    Ok(())
  }
}

/// [`LambdaFunction`] triggered by an API Gateway REST API.
pub type ApiGatewayLambda<R> = LambdaFunction<ApiGateway, R>;

/// [`LambdaFunction`] triggered by an API Gateway HTTP API.
pub type ApiGatewayV2Lambda<R> = LambdaFunction<ApiGatewayV2, R>;

/// [`LambdaFunction`] triggered by a Lambda function URL.
pub type FunctionUrlLambda<R> = LambdaFunction<FunctionUrl, R>;

/// Lambda function that serves HTTP requests using a [`Responder`].
///
/// The function is built once when the Lambda execution environment starts and then handles every
/// invocation. The adapter `A` (e.g., [`ApiGatewayV2`]) determines which trigger events the
/// function accepts.
///
/// # Example
///
/// ```rust,no_run
/// use responder_lambda::{
///   responder_fn, ApiGatewayV2Lambda, ApiGatewayV2httpRequest, HttpRequest, HttpResponse,
///   RequestContext, ResponderError,
/// };
///
/// #[tokio::main]
/// pub async fn main() -> Result<(), responder_lambda::BoxError> {
///   ApiGatewayV2Lambda::new(responder_fn(
///     |_request: HttpRequest, _context: RequestContext<ApiGatewayV2httpRequest>| async move {
///       Ok::<_, ResponderError>(HttpResponse::new("Hello, world!".into()))
///     },
///   ))
///   .run()
///   .await
/// }
/// ```
pub struct LambdaFunction<A, R> {
  responder: R,
  config: Config,
  services: Vec<Box<dyn Service>>,
  shut_down: AtomicBool,
  _adapter: PhantomData<fn() -> A>,
}

impl<A, R> LambdaFunction<A, R>
where
  A: EventAdapter,
  R: Responder<A::Event>,
{
  /// Create a Lambda function with the default [`Config`].
  pub fn new(responder: R) -> Self {
    Self {
      responder,
      config: Config::default(),
      services: Vec::new(),
      shut_down: AtomicBool::new(false),
      _adapter: PhantomData,
    }
  }

  /// Create a Lambda function whose responder is built by an async (and possibly fallible)
  /// initializer, such as one that opens database connections.
  pub async fn init<F, Fut, E>(init: F) -> Result<Self, BoxError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Into<BoxError>,
  {
    info!("Initializing {} responder", A::TRIGGER);
    match init().await {
      Ok(responder) => Ok(Self::new(responder)),
      Err(err) => {
        let err = err.into();
        error!(
          "Failed to initialize responder: {}",
          format_error(&*err, None, None)
        );
        Err(err)
      }
    }
  }

  /// Replace the function's [`Config`].
  pub fn with_config(mut self, config: Config) -> Self {
    self.config = config;
    self
  }

  /// Attach a [`Service`] that runs alongside the Lambda runtime and shuts down with it.
  pub fn with_service<S>(mut self, service: S) -> Self
  where
    S: Service + 'static,
  {
    self.services.push(Box::new(service));
    self
  }

  /// The function's [`Config`].
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The function's [`Responder`].
  pub fn responder(&self) -> &R {
    &self.responder
  }

  /// Handle a single invocation.
  ///
  /// HTTP errors returned by the responder are sent to the client as ordinary responses. Every
  /// other failure is logged and returned as an [`InvocationError`].
  pub async fn handle(
    &self,
    event: A::Event,
    lambda_context: LambdaContext,
  ) -> Result<A::Output, InvocationError> {
    let result = self.handle_inner(event, lambda_context).await;
    if let Err(err) = &result {
      error!(
        "Invocation failed: {}",
        format_error(err, Some(&err.name()), err.backtrace())
      );
    }
    result
  }

  async fn handle_inner(
    &self,
    event: A::Event,
    lambda_context: LambdaContext,
  ) -> Result<A::Output, InvocationError> {
    if self.config.log_events {
      trace!("Lambda event: {event:#?}");
      trace!("Lambda context: {lambda_context:#?}");
    }

    let request = match A::decode(&event, &self.config) {
      Ok(request) => request,
      Err(err)
        if self.config.event_error_policy == EventErrorPolicy::Respond
          && err.is_client_error() =>
      {
        debug!(
          "Rejecting {} event: {}",
          A::TRIGGER,
          format_error(&err, Some(err.name()), None)
        );
        return Self::encode(HttpResponse::from(err)).await;
      }
      Err(err) => return Err(InvocationError::Decode(A::TRIGGER, err)),
    };

    debug!(
      "{} {} (request ID {})",
      request.method(),
      request.uri(),
      lambda_context.request_id
    );

    let context = RequestContext::new(event, lambda_context);
    let response = match AssertUnwindSafe(self.responder.respond(request, context))
      .catch_unwind()
      .await
    {
      Ok(Ok(response)) => response,
      Ok(Err(ResponderError::Http(http_err))) => {
        debug!(
          "Responder returned HTTP error {}: {}",
          http_err.status(),
          http_err.message().unwrap_or_default()
        );
        http_err.into_response()
      }
      Ok(Err(ResponderError::Other(err))) => return Err(InvocationError::Responder(err)),
      Err(panic) => return Err(InvocationError::Panic(panic_message(panic))),
    };

    Self::encode(response).await
  }

  async fn encode(response: HttpResponse) -> Result<A::Output, InvocationError> {
    let response = CollectedResponse::collect(response)
      .await
      .map_err(|err| InvocationError::Encode(A::TRIGGER, err))?;
    debug!("Responding with status {}", response.status());
    A::encode(response).map_err(|err| InvocationError::Encode(A::TRIGGER, err))
  }

  /// Shut down the responder and then any attached services, in reverse order of attachment.
  /// Only the first call has any effect.
  ///
  /// Every service is shut down even if an earlier shutdown fails; the first error is returned.
  pub async fn shutdown(&self) -> Result<(), BoxError> {
    if self.shut_down.swap(true, Ordering::SeqCst) {
      return Ok(());
    }

    info!("Shutting down {} responder", A::TRIGGER);
    let mut result = self.responder.shutdown().await.map_err(|err| {
      error!(
        "Failed to shut down responder: {}",
        format_error(&*err, None, None)
      );
      err
    });

    for service in self.services.iter().rev() {
      info!("Shutting down service `{}`", service.name());
      if let Err(err) = service.shutdown().await {
        error!(
          "Failed to shut down service `{}`: {}",
          service.name(),
          format_error(&*err, None, None)
        );
        result = result.and(Err(err));
      }
    }

    result
  }

  /// Wait for the first attached service to return. Never completes without services.
  async fn run_services(&self) -> Result<(), BoxError> {
    if self.services.is_empty() {
      return futures::future::pending().await;
    }

    let (result, index, _) =
      futures::future::select_all(self.services.iter().map(|service| service.run())).await;
    let name = self.services[index].name();
    match &result {
      Ok(()) => info!("Service `{name}` exited"),
      Err(err) => error!(
        "Service `{name}` failed: {}",
        format_error(&**err, None, None)
      ),
    }
    result
  }

  /// Start the Lambda runtime and any attached services, and handle invocations until the runtime
  /// or a service exits or, if [`Config::graceful_shutdown`] is enabled, the process receives
  /// `SIGTERM` or `SIGINT`.
  ///
  /// The responder is shut down before returning.
  pub async fn run(self) -> Result<(), BoxError> {
    if self.config.graceful_shutdown {
      self.run_until(shutdown_signal()).await
    } else {
      self.run_until(futures::future::pending()).await
    }
  }

  /// Like [`run`](Self::run), but stops once `signal` completes instead of waiting for a process
  /// signal.
  pub async fn run_until<S>(self, signal: S) -> Result<(), BoxError>
  where
    S: Future<Output = ()>,
  {
    info!("Starting {} Lambda function", A::TRIGGER);

    let function = &self;
    let result = tokio::select! {
      biased;

      () = signal => {
        info!("Received shutdown signal");
        Ok(())
      }
      result = function.run_services() => result,
      result = lambda_runtime::run(service_fn(|event: LambdaEvent<A::Event>| async move {
        let LambdaEvent { payload, context } = event;
        function
          .handle(payload, context)
          .await
          .map_err(lambda_runtime::Error::from)
      })) => result,
    };

    let shutdown_result = self.shutdown().await;
    result.and(shutdown_result)
  }
}

/// Extract the message from a caught panic.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
  panic
    .downcast::<String>()
    .map(|message| *message)
    .or_else(|panic| {
      panic
        .downcast::<&'static str>()
        .map(|message| message.to_string())
    })
    .unwrap_or_else(|_| "unknown panic payload".to_string())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(err) = tokio::signal::ctrl_c().await {
      error!("Failed to listen for SIGINT: {err}");
      futures::future::pending::<()>().await
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(err) => {
        error!("Failed to listen for SIGTERM: {err}");
        futures::future::pending::<()>().await
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = futures::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => {}
    () = terminate => {}
  }
}

#[cfg(test)]
mod tests {
  use super::{LambdaFunction, Service};
  use crate::adapter::ApiGatewayV2;
  use crate::{
    responder_fn, ApiGatewayV2httpRequest, BoxError, Config, EventErrorPolicy, HttpError,
    HttpRequest, HttpResponse, InvocationError, LambdaContext, RequestContext, Responder,
    ResponderError, StatusCode,
  };

  use async_trait::async_trait;
  use aws_lambda_events::encodings::Body;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  fn event(
    route_key: &str,
    body: Option<&str>,
    is_base64_encoded: bool,
  ) -> ApiGatewayV2httpRequest {
    serde_json::from_value(json!({
      "version": "2.0",
      "routeKey": route_key,
      "rawQueryString": "",
      "headers": {"content-type": "text/plain"},
      "requestContext": {
        "http": {"method": "POST", "path": "/", "protocol": "HTTP/1.1"},
        "requestId": "request-id",
        "timeEpoch": 0
      },
      "body": body,
      "isBase64Encoded": is_base64_encoded
    }))
    .unwrap()
  }

  async fn echo(
    request: HttpRequest,
    context: RequestContext<ApiGatewayV2httpRequest>,
  ) -> Result<HttpResponse, ResponderError> {
    assert_eq!(context.event().route_key.as_deref(), Some("POST /echo"));
    let body = match request.into_body() {
      Body::Empty => Vec::new(),
      Body::Text(text) => text.into_bytes(),
      Body::Binary(bytes) => bytes,
    };
    let mut response = HttpResponse::new(body.into());
    response
      .headers_mut()
      .insert("content-type", "text/plain".parse().unwrap());
    Ok(response)
  }

  async fn fail(
    request: HttpRequest,
    _context: RequestContext<ApiGatewayV2httpRequest>,
  ) -> Result<HttpResponse, ResponderError> {
    match request.uri().path() {
      "/bad-request" => Err(HttpError::with_message(StatusCode::BAD_REQUEST, "BadRequest").into()),
      "/panic" => panic!("responder exploded"),
      _ => Err(anyhow::anyhow!("database unavailable").into()),
    }
  }

  #[tokio::test]
  async fn test_handle() {
    let function = LambdaFunction::<ApiGatewayV2, _>::new(responder_fn(echo));
    let output = function
      .handle(
        event("POST /echo", Some("aGVsbG8="), true),
        LambdaContext::default(),
      )
      .await
      .unwrap();

    assert_eq!(output.status_code, 200);
    assert_eq!(output.body, Some(Body::Text("hello".to_string())));
    assert!(!output.is_base64_encoded);
  }

  #[tokio::test]
  async fn test_http_error_recovery() {
    let function = LambdaFunction::<ApiGatewayV2, _>::new(responder_fn(fail));
    let output = function
      .handle(event("POST /bad-request", None, false), LambdaContext::default())
      .await
      .unwrap();

    assert_eq!(output.status_code, 400);
    assert_eq!(output.headers.get("content-length").unwrap(), "10");
    assert_eq!(output.body, Some(Body::Text("BadRequest".to_string())));
    assert!(!output.is_base64_encoded);
  }

  #[tokio::test]
  async fn test_responder_failures() {
    let function = LambdaFunction::<ApiGatewayV2, _>::new(responder_fn(fail));

    let err = function
      .handle(event("POST /db", None, false), LambdaContext::default())
      .await
      .unwrap_err();
    assert!(matches!(err, InvocationError::Responder(_)));

    let err = function
      .handle(event("POST /panic", None, false), LambdaContext::default())
      .await
      .unwrap_err();
    assert!(
      matches!(err, InvocationError::Panic(ref message) if message == "responder exploded")
    );
  }

  #[tokio::test]
  async fn test_event_error_policy() {
    let function = LambdaFunction::<ApiGatewayV2, _>::new(responder_fn(echo));
    let err = function
      .handle(event("POST /echo", Some("%%%"), true), LambdaContext::default())
      .await
      .unwrap_err();
    assert_eq!(err.name(), "Decode(InvalidBodyBase64)");

    let function =
      function.with_config(Config::default().event_error_policy(EventErrorPolicy::Respond));
    let output = function
      .handle(event("POST /echo", Some("%%%"), true), LambdaContext::default())
      .await
      .unwrap();
    assert_eq!(output.status_code, 400);
    assert_eq!(
      output.body,
      Some(Body::Text("Request body must be base64 encoded".to_string()))
    );

    // Malformed events still fail the invocation.
    let err = function
      .handle(event("$default", None, false), LambdaContext::default())
      .await
      .unwrap_err();
    assert_eq!(err.name(), "Decode(MalformedRouteKey)");
  }

  struct Counted(Arc<AtomicUsize>);

  #[async_trait]
  impl Responder<ApiGatewayV2httpRequest> for Counted {
    async fn respond(
      &self,
      _request: HttpRequest,
      _context: RequestContext<ApiGatewayV2httpRequest>,
    ) -> Result<HttpResponse, ResponderError> {
      Ok(HttpResponse::new(().into()))
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_shutdown_once() {
    let shutdowns = Arc::new(AtomicUsize::new(0));
    let function = LambdaFunction::<ApiGatewayV2, _>::new(Counted(shutdowns.clone()));

    function.shutdown().await.unwrap();
    function.shutdown().await.unwrap();
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_run_until_signal() {
    let shutdowns = Arc::new(AtomicUsize::new(0));
    LambdaFunction::<ApiGatewayV2, _>::new(Counted(shutdowns.clone()))
      .run_until(async {})
      .await
      .unwrap();
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
  }

  enum Behavior {
    Exit,
    Fail(&'static str),
    RunForever,
  }

  struct Worker {
    name: &'static str,
    behavior: Behavior,
    shutdowns: Arc<AtomicUsize>,
  }

  impl Worker {
    fn new(name: &'static str, behavior: Behavior) -> Self {
      Self {
        name,
        behavior,
        shutdowns: Arc::new(AtomicUsize::new(0)),
      }
    }
  }

  #[async_trait]
  impl Service for Worker {
    fn name(&self) -> &str {
      self.name
    }

    async fn run(&self) -> Result<(), BoxError> {
      match self.behavior {
        Behavior::Exit => Ok(()),
        Behavior::Fail(message) => Err(message.into()),
        Behavior::RunForever => futures::future::pending().await,
      }
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
      self.shutdowns.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_service_exit_stops_function() {
    let responder_shutdowns = Arc::new(AtomicUsize::new(0));
    let worker = Worker::new("refresher", Behavior::Exit);
    let worker_shutdowns = worker.shutdowns.clone();

    LambdaFunction::<ApiGatewayV2, _>::new(Counted(responder_shutdowns.clone()))
      .with_service(worker)
      .run_until(futures::future::pending())
      .await
      .unwrap();

    assert_eq!(responder_shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(worker_shutdowns.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_service_failure() {
    let idle = Worker::new("flusher", Behavior::RunForever);
    let failing = Worker::new("cache", Behavior::Fail("cache unreachable"));
    let idle_shutdowns = idle.shutdowns.clone();
    let failing_shutdowns = failing.shutdowns.clone();

    let function = LambdaFunction::<ApiGatewayV2, _>::new(Counted(Arc::default()))
      .with_service(idle)
      .with_service(failing);

    let err = function
      .run_until(futures::future::pending())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "cache unreachable");
    assert_eq!(idle_shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(failing_shutdowns.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_signal_shuts_down_services() {
    let worker = Worker::new("flusher", Behavior::RunForever);
    let worker_shutdowns = worker.shutdowns.clone();

    let function =
      LambdaFunction::<ApiGatewayV2, _>::new(Counted(Arc::default())).with_service(worker);
    function.run_until(async {}).await.unwrap();

    assert_eq!(worker_shutdowns.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_init() {
    let function = LambdaFunction::<ApiGatewayV2, _>::init(|| async {
      Ok::<_, anyhow::Error>(responder_fn(echo))
    })
    .await
    .unwrap();
    assert_eq!(function.config().get_default_scheme(), "https");

    let result = LambdaFunction::<ApiGatewayV2, Counted>::init(|| async {
      Err::<Counted, _>(anyhow::anyhow!("missing DATABASE_URL"))
    })
    .await;
    assert_eq!(result.err().unwrap().to_string(), "missing DATABASE_URL");
  }
}
