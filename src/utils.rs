pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Derives the websocket endpoint from the HTTP server URL.
pub fn socket_url(base_url: &str) -> String {
    let normalized = normalize_url(base_url);
    let base = normalized.trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}/socket", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}/socket", rest)
    } else {
        format!("wss://{}/socket", base)
    }
}

/// Drops `<...>` tags, including a trailing unterminated `<...`.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
