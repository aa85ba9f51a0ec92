//! Object-storage placement for provider results.
//!
//! Providers hand back time-limited upstream URLs. Results are copied into
//! our own bucket so they outlive the provider's retention window, with zip
//! bundles (OBJ + MTL + texture) split into individual objects.

use std::io::Read;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use meshgen_core::types::DbId;

use crate::error::ProviderError;

/// Storage URLs for one model's uploaded assets.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub model_url: String,
    pub mtl_url: Option<String>,
    pub texture_url: Option<String>,
}

/// Copies provider output into our object store. Callers treat each
/// operation as atomic: any failure fails the whole attempt.
#[async_trait]
pub trait ModelStorage: Send + Sync {
    /// Download the provider's result (a bare model file or a zip bundle),
    /// place its members under `models/{model_id}/`, and return their
    /// storage URLs.
    async fn download_and_upload_model(
        &self,
        upstream_url: &str,
        model_id: DbId,
        format: &str,
    ) -> Result<ModelAssets, ProviderError>;

    async fn download_and_upload_preview_image(
        &self,
        url: &str,
        model_id: DbId,
    ) -> Result<String, ProviderError>;

    /// Copy a candidate image out of the image provider's (time-limited,
    /// often signed) URL into `images/{request_id}/`, returning its
    /// storage URL.
    async fn download_and_upload_image(
        &self,
        upstream_url: &str,
        request_id: DbId,
        image_index: i32,
    ) -> Result<String, ProviderError>;

    async fn delete_object(&self, key: &str) -> Result<(), ProviderError>;
}

/// S3-backed implementation.
pub struct S3ModelStorage {
    s3: aws_sdk_s3::Client,
    http: reqwest::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ModelStorage {
    pub fn new(
        s3: aws_sdk_s3::Client,
        http: reqwest::Client,
        bucket: String,
        public_base_url: String,
    ) -> Self {
        let public_base_url = public_base_url.trim_end_matches('/').to_string();
        Self {
            s3,
            http,
            bucket,
            public_base_url,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: status.as_u16(),
                body: format!("download from {url} failed"),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, ProviderError> {
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type_for(key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| ProviderError::Storage(e.to_string()))?;
        Ok(format!("{}/{key}", self.public_base_url))
    }
}

#[async_trait]
impl ModelStorage for S3ModelStorage {
    async fn download_and_upload_model(
        &self,
        upstream_url: &str,
        model_id: DbId,
        format: &str,
    ) -> Result<ModelAssets, ProviderError> {
        let bytes = self.download(upstream_url).await?;

        if !is_zip(&bytes) {
            let key = format!("models/{model_id}/model.{}", format.to_lowercase());
            let model_url = self.upload(&key, bytes).await?;
            return Ok(ModelAssets {
                model_url,
                mtl_url: None,
                texture_url: None,
            });
        }

        // zip extraction is synchronous; keep it off the runtime threads.
        let members = tokio::task::spawn_blocking(move || extract_archive(bytes))
            .await
            .map_err(|e| ProviderError::Storage(format!("archive task failed: {e}")))??;

        let mut assets = ModelAssets {
            model_url: String::new(),
            mtl_url: None,
            texture_url: None,
        };
        let format_ext = format.to_lowercase();
        for (name, data) in members {
            let key = format!("models/{model_id}/{name}");
            let ext = extension_of(&name);
            let url = self.upload(&key, data).await?;
            if ext == format_ext || is_model_extension(&ext) {
                if assets.model_url.is_empty() {
                    assets.model_url = url;
                }
            } else if ext == "mtl" {
                assets.mtl_url = Some(url);
            } else if is_image_extension(&ext) {
                assets.texture_url = Some(url);
            }
        }
        if assets.model_url.is_empty() {
            return Err(ProviderError::MalformedResponse("model file in archive"));
        }
        Ok(assets)
    }

    async fn download_and_upload_preview_image(
        &self,
        url: &str,
        model_id: DbId,
    ) -> Result<String, ProviderError> {
        let bytes = self.download(url).await?;
        let ext = match extension_of(url) {
            ext if is_image_extension(&ext) => ext,
            _ => "png".to_string(),
        };
        let key = format!("previews/{model_id}/preview.{ext}");
        self.upload(&key, bytes).await
    }

    async fn download_and_upload_image(
        &self,
        upstream_url: &str,
        request_id: DbId,
        image_index: i32,
    ) -> Result<String, ProviderError> {
        let bytes = self.download(upstream_url).await?;
        let key = image_object_key(request_id, image_index, upstream_url);
        self.upload(&key, bytes).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), ProviderError> {
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ProviderError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

fn extract_archive(bytes: Vec<u8>) -> Result<Vec<(String, Vec<u8>)>, ProviderError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut members = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        // Flatten to the basename; provider bundles nest under one folder.
        let Some(name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()))
        else {
            continue;
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        members.push((name, data));
    }
    Ok(members)
}

fn extension_of(name: &str) -> String {
    name.rsplit('.').next().unwrap_or_default().to_lowercase()
}

/// Bucket key for one candidate image. The key is derived from our own
/// ids, never from the upstream URL, so signed query strings cannot leak
/// into stored paths.
fn image_object_key(request_id: DbId, image_index: i32, upstream_url: &str) -> String {
    let path = upstream_url
        .split(['?', '#'])
        .next()
        .unwrap_or(upstream_url);
    let ext = match extension_of(path) {
        ext if is_image_extension(&ext) => ext,
        _ => "png".to_string(),
    };
    format!("images/{request_id}/{image_index}.{ext}")
}

fn is_model_extension(ext: &str) -> bool {
    matches!(ext, "obj" | "glb" | "gltf" | "fbx" | "stl")
}

fn is_image_extension(ext: &str) -> bool {
    matches!(ext, "png" | "jpg" | "jpeg" | "webp")
}

fn content_type_for(key: &str) -> &'static str {
    match extension_of(key).as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "obj" | "mtl" => "text/plain",
        "gcode" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zip_detection_by_magic() {
        assert!(is_zip(b"PK\x03\x04rest"));
        assert!(!is_zip(b"glTF binary"));
        assert!(!is_zip(b""));
    }

    #[test]
    fn archive_members_are_flattened() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.add_directory("bundle/", options).unwrap();
            writer.start_file("bundle/model.obj", options).unwrap();
            writer.write_all(b"v 0 0 0").unwrap();
            writer.start_file("bundle/model.mtl", options).unwrap();
            writer.write_all(b"newmtl m").unwrap();
            writer.finish().unwrap();
        }
        let members = extract_archive(cursor.into_inner()).unwrap();
        let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["model.obj", "model.mtl"]);
    }

    #[test]
    fn image_keys_never_carry_upstream_query_strings() {
        let signed = "https://cdn.provider.example/img/abc.png?sig=secret&exp=123";
        let key = image_object_key(7, 2, signed);
        assert_eq!(key, "images/7/2.png");

        // Unknown or missing extensions fall back to png.
        assert_eq!(image_object_key(7, 0, "https://x/blob?sig=s"), "images/7/0.png");
        assert_eq!(image_object_key(9, 3, "https://x/pic.webp#frag"), "images/9/3.webp");
    }

    #[test]
    fn extension_classification() {
        assert!(is_model_extension("glb"));
        assert!(!is_model_extension("mtl"));
        assert!(is_image_extension("jpeg"));
        assert_eq!(extension_of("models/7/Texture.PNG"), "png");
    }
}
