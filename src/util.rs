const VK_API_DOMAIN: &str = "VK_API_DOMAIN";

const DEFAULT_API_DOMAIN: &str = "api.vk.com";

pub fn get_default_api_domain() -> &'static str {
    DEFAULT_API_DOMAIN
}

pub fn get_api_domain() -> String {
    domain_or_default(std::env::var(VK_API_DOMAIN).ok())
}

fn domain_or_default(domain: Option<String>) -> String {
    domain
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| get_default_api_domain().to_string())
}

/// Base URL for API method calls on the given domain
pub fn api_base_url(domain: &str) -> String {
    format!("https://{domain}/method")
}
