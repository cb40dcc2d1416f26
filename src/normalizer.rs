use crate::{
    error::{Result, TryOnError},
    fetcher::ImageFetcher,
    gradio::GradioClient,
    models::OutputImage,
};

/// Turns whatever the remote app returned into image bytes.
#[derive(Clone)]
pub struct ResultNormalizer {
    fetcher: ImageFetcher,
}

impl ResultNormalizer {
    pub fn new(fetcher: ImageFetcher) -> Self {
        Self { fetcher }
    }

    /// `session` is the app that produced the output; files it serves are
    /// fetched with its credentials.
    pub async fn normalize(
        &self,
        output: OutputImage,
        session: Option<&GradioClient>,
    ) -> Result<Vec<u8>> {
        log::debug!("Normalizing {} output", output.kind());

        match output {
            OutputImage::RemoteUrl(url) | OutputImage::BareUrl(url) => {
                let token = session
                    .filter(|s| s.serves(&url))
                    .and_then(|s| s.token());
                Ok(self.fetcher.fetch_with_token(&url, token).await?.data)
            }
            OutputImage::LocalPath(path) => {
                log::debug!("Reading result from local path {}", path.display());
                Ok(tokio::fs::read(&path).await?)
            }
            OutputImage::Blob { data, .. } => Ok(data),
            OutputImage::Unrecognized(value) => {
                log::error!("Unrecognized output from remote app: {}", value);
                Err(TryOnError::Format)
            }
        }
    }
}
