use anyhow::anyhow;
use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};

const MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 2000;

pub struct OpenaiClient {
    client: Client<OpenAIConfig>,
}

impl Default for OpenaiClient {
    fn default() -> Self {
        OpenaiClient {
            client: Client::new(),
        }
    }
}

impl OpenaiClient {
    pub fn new(api_key: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenaiClient {
            client: Client::with_config(config),
        }
    }

    /// Sends one prompt and returns the model's raw text. Prompts instruct the
    /// model to answer with JSON only; parsing and fallback live in
    /// `field_extractor` so they stay testable without a network.
    pub async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(MODEL)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into()])
            .max_tokens(MAX_TOKENS)
            .build()?;

        let response = self.client.chat().create(request).await?;
        log::debug!("model usage: {:?}", response.usage);

        response
            .choices
            .first()
            .ok_or_else(|| anyhow!("no choices in openai response"))?
            .message
            .content
            .clone()
            .ok_or_else(|| anyhow!("no content in openai response"))
    }
}
