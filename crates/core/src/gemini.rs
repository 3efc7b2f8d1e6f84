use reqwest::StatusCode;
use url::Url;

pub const PROVIDER: &str = "gemini";

/// `{base}/models/{model}:{method}`, tolerating a base URL without a trailing slash.
pub fn model_endpoint(base_url: &str, model: &str, method: &str) -> Result<Url, url::ParseError> {
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)?
    } else {
        Url::parse(&format!("{base_url}/"))?
    };
    let model = model.trim_start_matches("models/");
    base.join(&format!("models/{model}:{method}"))
}

/// Rate-limit and quota failures are reported as HTTP 429 or a
/// `RESOURCE_EXHAUSTED` status in the error body.
pub fn is_quota_failure(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let lowered = body.to_lowercase();
    lowered.contains("resource_exhausted")
        || lowered.contains("resourceexhausted")
        || lowered.contains("quota")
}
