use env_logger::Env;
use responder_lambda::{responder_fn, ApiGatewayV2Lambda, BoxError};

#[tokio::main]
pub async fn main() -> Result<(), BoxError> {
  // TIP: Use the `log4rs` crate for more fine-grained control over logging.
  env_logger::init_from_env(Env::default().filter_or("RUST_LOG", "info"));

  ApiGatewayV2Lambda::new(responder_fn(maths::respond))
    .run()
    .await
}
