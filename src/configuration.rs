use std::path::PathBuf;

use crate::domain::record::PipelineVariant;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub webdriver: WebdriverSettings,
    pub api_keys: ApiKeySettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct PipelineSettings {
    pub variant: PipelineVariant,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub artifact_dir: PathBuf,
    pub cooldown_min_secs: u64,
    pub cooldown_max_secs: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct WebdriverSettings {
    pub server_url: String,
    pub selector_timeout_secs: u64,
    pub page_load_timeout_secs: u64,
    pub page_settle_secs: u64,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApiKeySettings {
    pub openai: String,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration"))
        // APP_API_KEYS__OPENAI=sk-... overrides the yaml value
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let settings: Settings = settings.try_deserialize()?;

    if settings.pipeline.cooldown_min_secs > settings.pipeline.cooldown_max_secs {
        return Err(config::ConfigError::Message(
            "pipeline.cooldown_min_secs must not exceed pipeline.cooldown_max_secs".to_string(),
        ));
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_settings_deserialize() {
        let yaml = r#"
pipeline:
  variant: executives-full
  input_file: ./data/input.csv
  output_file: ./data/output_executive.csv
  artifact_dir: ./artifacts
  cooldown_min_secs: 4
  cooldown_max_secs: 8
webdriver:
  server_url: http://localhost:9515
  selector_timeout_secs: 3
  page_load_timeout_secs: 30
  page_settle_secs: 5
api_keys:
  openai: test-key
"#;
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.pipeline.variant, PipelineVariant::ExecutivesFull);
        assert_eq!(settings.webdriver.selector_timeout_secs, 3);
        assert_eq!(settings.api_keys.openai, "test-key");
    }
}
