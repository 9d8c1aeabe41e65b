pub fn get_api_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| {
        let default = "http://localhost:3000/api/v1".to_string();
        tracing::trace!("API_BASE_URL not set, using default: {default}");
        default
    })
}

pub fn get_listen_addr() -> String {
    std::env::var("LISTEN_ADDR").unwrap_or_else(|_| {
        let default = "127.0.0.1:8080".to_string();
        tracing::trace!("LISTEN_ADDR not set, using default: {default}");
        default
    })
}

pub fn get_request_timeout_secs() -> u64 {
    std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|value| value.parse().ok()).unwrap_or_else(
        || {
            tracing::trace!("REQUEST_TIMEOUT_SECS not set, using default: 10");
            10
        },
    )
}
