use lineup_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render("database.url", &config.database.url));
    lines.push(render("database.max_connections", &config.database.max_connections.to_string()));
    lines.push(render("database.timeout_secs", &config.database.timeout_secs.to_string()));

    lines.push(render("carrier.base_url", &config.carrier.base_url));
    lines.push(render("carrier.tenant", &config.carrier.tenant));
    lines.push(render(
        "carrier.client_id",
        &redact_secret(config.carrier.client_id.expose_secret()),
    ));
    lines.push(render(
        "carrier.client_secret",
        &redact_secret(config.carrier.client_secret.expose_secret()),
    ));
    lines.push(render(
        "carrier.request_timeout_secs",
        &config.carrier.request_timeout_secs.to_string(),
    ));
    lines.push(render(
        "carrier.token_refresh_buffer_secs",
        &config.carrier.token_refresh_buffer_secs.to_string(),
    ));

    lines.push(render(
        "orchestrator.initial_poll_delay_ms",
        &config.orchestrator.initial_poll_delay_ms.to_string(),
    ));
    lines.push(render(
        "orchestrator.poll_interval_ms",
        &config.orchestrator.poll_interval_ms.to_string(),
    ));
    lines.push(render(
        "orchestrator.max_poll_attempts",
        &config.orchestrator.max_poll_attempts.to_string(),
    ));
    lines.push(render(
        "orchestrator.max_backoff_delay_ms",
        &config.orchestrator.max_backoff_delay_ms.to_string(),
    ));

    lines.push(render("logging.level", &config.logging.level));
    lines.push(render("logging.format", &format!("{:?}", config.logging.format).to_lowercase()));

    lines.join("\n")
}

fn render(key: &str, value: &str) -> String {
    format!("  {key} = {value}")
}

fn redact_secret(value: &str) -> String {
    if value.is_empty() {
        "(unset)".to_string()
    } else if value.len() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", &value[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::redact_secret;

    #[test]
    fn secrets_are_redacted_but_identifiable() {
        assert_eq!(redact_secret(""), "(unset)");
        assert_eq!(redact_secret("abc"), "****");
        assert_eq!(redact_secret("client-12345"), "clie****");
    }
}
