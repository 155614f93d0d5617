use std::time::Duration;

/// Build a [`reqwest::Client`] with a fixed per-request timeout.
///
/// The `User-Agent` header is only set when one is given.
pub fn build_client(
    user_agent: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::ClientBuilder::new().timeout(timeout);
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent);
    }
    Ok(builder.build()?)
}
