use super::SinkError;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);

/// POST the line payload with up to three attempts; the delay before
/// attempt `n` is `n * 500ms` (so 0, 500ms, 1s).
pub(crate) async fn send_with_retry(
    client: &reqwest::Client,
    endpoint: &str,
    payload: String,
    family: &'static str,
) -> Result<(), SinkError> {
    let mut last_error = String::new();

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            let delay = BASE_DELAY * attempt;
            tracing::debug!(
                family,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying sink request"
            );
            tokio::time::sleep(delay).await;
        }

        match client
            .post(endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(payload.clone())
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
                    if attempt > 0 {
                        tracing::info!(
                            family,
                            attempts = attempt + 1,
                            "sink request succeeded after retry"
                        );
                    }
                    return Ok(());
                }
                tracing::warn!(
                    family,
                    status = %status,
                    attempt = attempt + 1,
                    "unexpected status code from sink"
                );
                last_error = SinkError::UnexpectedStatus(status).to_string();
            }
            Err(e) => {
                tracing::warn!(
                    family,
                    error = %e,
                    attempt = attempt + 1,
                    "sink request failed"
                );
                last_error = e.to_string();
            }
        }
    }

    Err(SinkError::RetriesExhausted {
        family,
        attempts: MAX_ATTEMPTS,
        last_error,
    })
}
