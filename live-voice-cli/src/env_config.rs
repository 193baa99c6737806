use live_voice_core::SessionConfiguration;

/// API key variables, in lookup order.
const API_KEY_VARS: [&str; 3] = ["LIVE_VOICE_API_KEY", "GEMINI_API_KEY", "API_KEY"];

/// Build the session configuration from process environment variables.
pub fn from_env() -> SessionConfiguration {
    from_lookup(|name| std::env::var(name).ok())
}

/// Defaults overridden by whatever `lookup` returns. Empty values are ignored.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SessionConfiguration {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut config = SessionConfiguration::default();

    config.api_key = API_KEY_VARS.iter().find_map(|name| get(*name));
    if let Some(model) = get("LIVE_VOICE_MODEL") {
        config.model = model;
    }
    if let Some(voice) = get("LIVE_VOICE_VOICE") {
        config.voice_name = voice;
    }
    if let Some(endpoint) = get("LIVE_VOICE_ENDPOINT") {
        config.endpoint = endpoint;
    }
    config
}
