use crate::core::error::{RateError, RateResult};
use reqwest::Client;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with a flat delay between attempts
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `attempts`: Total number of runs, at least one
/// - `delay`: Pause after each failed attempt except the last
///
/// # Returns
/// Either the first successful result or the error of the final attempt
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    attempts: usize,
    delay: Duration,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, attempts, err
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

pub fn http_client(timeout: Duration) -> RateResult<Client> {
    Client::builder()
        .user_agent("xcurrency/1.0")
        .timeout(timeout)
        .build()
        .map_err(|e| RateError::transport("client", e))
}

/// Issues a GET and returns the body of a successful response.
pub async fn get_body(client: &Client, url: &str, provider: &str) -> RateResult<Vec<u8>> {
    debug!("Requesting rates from {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RateError::transport(provider, e))?;

    if !response.status().is_success() {
        return Err(RateError::HttpStatus {
            provider: provider.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| RateError::transport(provider, e))?;
    Ok(body.to_vec())
}
