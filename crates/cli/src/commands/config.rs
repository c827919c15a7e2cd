use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use skydesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.provider",
        config.llm.provider.as_str(),
        source("llm.provider", "SKYDESK_LLM_PROVIDER"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "SKYDESK_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "SKYDESK_LLM_BASE_URL"),
    ));

    let llm_api_key = if config.llm.has_api_key() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", "SKYDESK_LLM_API_KEY"),
    ));

    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", "SKYDESK_LLM_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "llm.max_retries",
        &config.llm.max_retries.to_string(),
        source("llm.max_retries", "SKYDESK_LLM_MAX_RETRIES"),
    ));

    lines.push(render_line(
        "chat.max_steps_per_turn",
        &config.chat.max_steps_per_turn.to_string(),
        source("chat.max_steps_per_turn", "SKYDESK_CHAT_MAX_STEPS_PER_TURN"),
    ));
    lines.push(render_line(
        "chat.greeting",
        &config.chat.greeting,
        source("chat.greeting", "SKYDESK_CHAT_GREETING"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "SKYDESK_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "SKYDESK_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("skydesk.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/skydesk.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
