use reqwest::{header::CONTENT_TYPE, Client};

use crate::{
    error::{Result, TryOnError},
    models::{file_name_from_url, guess_mime_type, ImageBytes},
};

/// Downloads images into memory. Failures are not retried.
#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
}

impl ImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<ImageBytes> {
        self.fetch_with_token(url, None).await
    }

    pub async fn fetch_with_token(&self, url: &str, token: Option<&str>) -> Result<ImageBytes> {
        log::debug!("Fetching image {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TryOnError::Fetch(format!("failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            log::error!("Image fetch {} returned {}", url, status);
            return Err(TryOnError::Fetch(format!(
                "failed to fetch {}: HTTP {}",
                url, status
            )));
        }

        let file_name = file_name_from_url(url);
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| is_media_type(v))
            .unwrap_or_else(|| guess_mime_type(&file_name).to_string());

        let data = response
            .bytes()
            .await
            .map_err(|e| TryOnError::Fetch(format!("failed to read {}: {}", url, e)))?;

        log::debug!("Fetched {} ({} bytes, {})", file_name, data.len(), mime_type);
        Ok(ImageBytes::new(data.to_vec(), mime_type, file_name))
    }
}

/// `type/subtype` made of RFC 6838 name characters.
fn is_media_type(value: &str) -> bool {
    let is_name = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    };
    match value.split_once('/') {
        Some((kind, subtype)) => is_name(kind) && is_name(subtype),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_bytes_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg; charset=binary")
                    .set_body_bytes(b"person".to_vec()),
            )
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new(Client::new());
        let image = fetcher.fetch(&format!("{}/p.jpg", server.uri())).await.unwrap();

        assert_eq!(image.data, b"person");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.file_name, "p.jpg");
    }

    #[tokio::test]
    async fn test_malformed_content_type_falls_back_to_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image")
                    .set_body_bytes(b"person".to_vec()),
            )
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new(Client::new());
        let image = fetcher.fetch(&format!("{}/p.jpg", server.uri())).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn test_is_media_type() {
        assert!(is_media_type("image/png"));
        assert!(is_media_type("image/svg+xml"));
        assert!(!is_media_type("image"));
        assert!(!is_media_type("image/"));
        assert!(!is_media_type("/png"));
        assert!(!is_media_type("image/p ng"));
    }

    #[tokio::test]
    async fn test_fetch_sends_token_when_given() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file=/tmp/out.png"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"out".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new(Client::new());
        let image = fetcher
            .fetch_with_token(&format!("{}/file=/tmp/out.png", server.uri()), Some("hf_test"))
            .await
            .unwrap();
        assert_eq!(image.data, b"out");
    }

    #[tokio::test]
    async fn test_non_success_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new(Client::new());
        let err = fetcher
            .fetch(&format!("{}/missing.jpg", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, TryOnError::Fetch(_)));
        assert!(err.to_string().contains("404"));
    }
}
