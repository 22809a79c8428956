//! Collaborators outside of the core
//!
//! Key service, object store and image catalog are provider SDK wrappers that live outside of this
//! crate. [LocalFileLoader] is the one loader implemented here: local paths are read directly,
//! `s3://` urls are delegated to an [ObjectStore].
use crate::error::{Error, Result};
use crate::provider::{RetryPolicy, Retrying, StackProvider};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;

pub type EncryptionContext = IndexMap<String, String>;

#[async_trait::async_trait]
pub trait KeyService: Send + Sync {
    async fn encrypt(
        &self,
        region: &str,
        key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>>;

    async fn decrypt(
        &self,
        region: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>>;
}

#[async_trait::async_trait]
pub trait FileLoader: Send + Sync {
    /// Load `url` as utf-8 text, relative paths are resolved against `working_dir`
    async fn load(&self, url: &str, working_dir: &Path) -> Result<String>;
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFilter {
    /// Name pattern, `*` matches anything
    pub name: String,
    /// Only images that are not shared publicly
    pub private_only: bool,
}

impl ImageFilter {
    pub fn taupage() -> Self {
        Self {
            name: "Taupage-AMI-*".to_string(),
            private_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub image_id: String,
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait ImageCatalog: Send + Sync {
    async fn images(&self, region: &str, filter: &ImageFilter) -> Result<Vec<Image>>;
}

/// The most recently created image
pub fn latest_image(images: &[Image]) -> Option<&Image> {
    images.iter().max_by_key(|image| image.creation_date)
}

/// Everything the orchestrator talks to
#[derive(Clone)]
pub struct Services {
    pub provider: Arc<dyn StackProvider>,
    pub key_service: Arc<dyn KeyService>,
    pub file_loader: Arc<dyn FileLoader>,
    pub image_catalog: Arc<dyn ImageCatalog>,
}

impl Services {
    /// Bundles the collaborators, retrying throttled provider calls with the default policy
    pub fn new(
        provider: Arc<dyn StackProvider>,
        key_service: Arc<dyn KeyService>,
        file_loader: Arc<dyn FileLoader>,
        image_catalog: Arc<dyn ImageCatalog>,
    ) -> Self {
        Self {
            provider: Arc::new(Retrying::new(provider, RetryPolicy::default())),
            key_service,
            file_loader,
            image_catalog,
        }
    }
}

/// Where a file url points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
    ObjectStore { bucket: String, key: String },
    Path(std::path::PathBuf),
}

impl FileLocation {
    pub fn parse(url: &str, working_dir: &Path) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                .ok_or_else(|| {
                    Error::invalid_config(format!("{url:?} must have the form s3://bucket/key"))
                })?;

            return Ok(FileLocation::ObjectStore {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let path = Path::new(url);
        Ok(FileLocation::Path(if path.is_absolute() {
            path.to_path_buf()
        } else {
            working_dir.join(path)
        }))
    }
}

#[derive(Default, Clone)]
pub struct LocalFileLoader {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl LocalFileLoader {
    pub fn new(object_store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { object_store }
    }
}

#[async_trait::async_trait]
impl FileLoader for LocalFileLoader {
    #[tracing::instrument(level = "debug", skip(self, working_dir))]
    async fn load(&self, url: &str, working_dir: &Path) -> Result<String> {
        let bytes = match FileLocation::parse(url, working_dir)? {
            FileLocation::ObjectStore { bucket, key } => {
                let store = self.object_store.as_ref().ok_or_else(|| {
                    Error::invalid_config(format!("no object store available to load {url}"))
                })?;
                store.get(&bucket, &key).await?
            }
            FileLocation::Path(path) => {
                tokio::fs::read(&path).await.map_err(|source| Error::Io {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };

        String::from_utf8(bytes)
            .map_err(|e| Error::Generic(anyhow::anyhow!("{url} is not valid utf-8: {e}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    struct StaticStore;

    #[async_trait::async_trait]
    impl ObjectStore for StaticStore {
        async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
            Ok(format!("{bucket}/{key}").into_bytes())
        }
    }

    #[test]
    fn locations() {
        let working_dir = Path::new("/work");
        assert_eq!(
            FileLocation::parse("s3://bucket/path/to/key", working_dir).unwrap(),
            FileLocation::ObjectStore {
                bucket: "bucket".into(),
                key: "path/to/key".into()
            }
        );
        assert_eq!(
            FileLocation::parse("templates/a.yml", working_dir).unwrap(),
            FileLocation::Path(PathBuf::from("/work/templates/a.yml"))
        );
        assert_eq!(
            FileLocation::parse("/abs/a.yml", working_dir).unwrap(),
            FileLocation::Path(PathBuf::from("/abs/a.yml"))
        );
        assert!(FileLocation::parse("s3://bucket", working_dir).is_err());
        assert!(FileLocation::parse("s3:///key", working_dir).is_err());
    }

    #[tokio::test]
    async fn loads_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.txt"), "contents").unwrap();

        let loader = LocalFileLoader::default();
        assert_eq!(loader.load("data.txt", dir.path()).await.unwrap(), "contents");
        assert!(matches!(
            loader.load("missing.txt", dir.path()).await,
            Err(Error::Io { .. })
        ));
    }

    #[tokio::test]
    async fn routes_s3_urls_to_object_store() {
        let loader = LocalFileLoader::new(Some(Arc::new(StaticStore)));
        assert_eq!(
            loader.load("s3://b/k.txt", Path::new(".")).await.unwrap(),
            "b/k.txt"
        );

        let without_store = LocalFileLoader::default();
        assert!(without_store.load("s3://b/k.txt", Path::new(".")).await.is_err());
    }

    #[test]
    fn latest_image_by_creation_date() {
        let image = |id: &str, day: u32| Image {
            image_id: id.to_string(),
            name: format!("Taupage-AMI-{id}"),
            creation_date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        };
        let images = vec![image("a", 3), image("b", 9), image("c", 5)];

        assert_eq!(latest_image(&images).map(|i| i.image_id.as_str()), Some("b"));
        assert_eq!(latest_image(&[]), None);
    }
}
