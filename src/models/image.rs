use serde::{Deserialize, Serialize};

/// Raw image bytes held in memory, tagged with what we know about them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBytes {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl ImageBytes {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnRequest {
    pub person_image_url: String,
    pub garment_image_url: String,
}

impl TryOnRequest {
    pub fn new(person_image_url: impl Into<String>, garment_image_url: impl Into<String>) -> Self {
        Self {
            person_image_url: person_image_url.into(),
            garment_image_url: garment_image_url.into(),
        }
    }
}

/// Last path segment of a URL, used as the upload file name.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let path = without_scheme
        .split_once('/')
        .map(|(_, path)| path)
        .unwrap_or("");
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("image")
        .to_string()
}

/// Best guess at an image MIME type from a file name extension.
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
