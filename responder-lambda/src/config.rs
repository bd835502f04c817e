/// How an invocation reacts when the trigger event can't be converted into an HTTP request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventErrorPolicy {
  /// Fail the invocation so that the Lambda platform reports the error.
  #[default]
  Fail,
  /// Respond with `400 Bad Request` when the client sent something unusable (e.g., a body that
  /// isn't valid base64). Errors caused by a malformed event still fail the invocation.
  Respond,
}

/// Settings for a [`LambdaFunction`](crate::LambdaFunction).
#[derive(Clone, Debug)]
pub struct Config {
  pub(crate) default_scheme: String,
  pub(crate) event_error_policy: EventErrorPolicy,
  pub(crate) log_events: bool,
  pub(crate) graceful_shutdown: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      default_scheme: "https".to_string(),
      event_error_policy: EventErrorPolicy::default(),
      log_events: false,
      graceful_shutdown: true,
    }
  }
}

impl Config {
  /// URI scheme used for API Gateway REST requests that lack an `X-Forwarded-Proto` header
  /// (default: `https`).
  pub fn default_scheme(mut self, scheme: impl Into<String>) -> Self {
    self.default_scheme = scheme.into();
    self
  }

  /// Policy for events that can't be decoded (default: [`EventErrorPolicy::Fail`]).
  pub fn event_error_policy(mut self, policy: EventErrorPolicy) -> Self {
    self.event_error_policy = policy;
    self
  }

  /// Log every raw event and Lambda context at `trace` level (default: `false`).
  ///
  /// Events may contain credentials, so leave this off in production.
  pub fn log_events(mut self, enabled: bool) -> Self {
    self.log_events = enabled;
    self
  }

  /// Shut down the responder when the process receives `SIGTERM` or `SIGINT` (default: `true`).
  pub fn graceful_shutdown(mut self, enabled: bool) -> Self {
    self.graceful_shutdown = enabled;
    self
  }

  /// Returns the configured default URI scheme.
  pub fn get_default_scheme(&self) -> &str {
    &self.default_scheme
  }

  /// Returns the configured event error policy.
  pub fn get_event_error_policy(&self) -> EventErrorPolicy {
    self.event_error_policy
  }
}
