use custom_email_sender::{
    config::Config,
    crypto::KmsKeyService,
    domain::TriggerEvent,
    email::SendGridEmailProvider,
    telemetry, Handler,
};
use lambda_runtime::{service_fn, LambdaEvent};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    telemetry::init(&config.telemetry);

    let key_service = KmsKeyService::from_env().await;
    let provider = SendGridEmailProvider::new(&config.sendgrid)?;
    let handler = Arc::new(Handler::new(
        config,
        Arc::new(key_service),
        Arc::new(provider),
    ));

    info!("Starting custom email sender");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<TriggerEvent>| {
        let handler = handler.clone();
        async move { handler.handle(event.payload).await }
    }))
    .await
}
