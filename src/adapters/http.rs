use crate::utils::error::{DataSourceError, Result};
use reqwest::RequestBuilder;

/// Sends one request and returns the body of a 2xx response.
///
/// The only place where HTTP-backed data sources look at transport errors
/// and status codes.
pub async fn dispatch(service: &'static str, request: RequestBuilder) -> Result<String> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("{} request failed before a response: {}", service, e);
            return Err(DataSourceError::HttpError(e));
        }
    };

    let status = response.status();
    tracing::debug!("{} response status: {}", service, status);

    let body = response.text().await?;
    if !status.is_success() {
        tracing::warn!(
            "{} returned HTTP {}: {}",
            service,
            status.as_u16(),
            truncate(&body, 512)
        );
        return Err(DataSourceError::HttpStatus {
            service,
            status: status.as_u16(),
            message: body,
        });
    }

    Ok(body)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
