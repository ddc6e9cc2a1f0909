use env_logger::Env;
use meibo::configuration::get_configuration;
use meibo::services::{run_pipeline, Droid, OpenaiClient, RunContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let droid = Droid::new(&configuration.webdriver).await?;
    let openai_client = OpenaiClient::new(configuration.api_keys.openai.clone());
    let ctx = match RunContext::new(&configuration.pipeline.artifact_dir) {
        Ok(ctx) => ctx,
        Err(e) => {
            droid.quit().await;
            return Err(e);
        }
    };

    let result = run_pipeline(&droid, &ctx, &openai_client, &configuration.pipeline).await;

    // Session and screenshots are cleaned up on every exit path.
    ctx.teardown();
    droid.quit().await;
    result
}
