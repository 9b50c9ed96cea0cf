use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::{
    DrapeError, DrapeResult,
    assets::SourceImage,
    config::ProviderConfig,
    depth::{
        RawDepth,
        fallback::{FALLBACK_METHOD, synthesize_garment_depth},
    },
};

/// A remote (or otherwise fallible) depth estimator.
pub trait DepthEstimator: Send + Sync {
    /// Method label reported alongside a successful result.
    fn label(&self) -> &str;

    fn estimate<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, DrapeResult<image::DynamicImage>>;
}

/// Posts the photo as multipart field `file` and expects an image body (8- or 16-bit PNG).
pub struct HttpDepthEstimator {
    label: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDepthEstimator {
    pub fn new(cfg: &ProviderConfig) -> DrapeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| DrapeError::provider(format!("build http client: {e}")))?;
        Ok(Self {
            label: cfg.label.clone(),
            endpoint: cfg.endpoint.clone(),
            client,
        })
    }

    async fn request(&self, image: &[u8]) -> DrapeResult<image::DynamicImage> {
        let part = reqwest::multipart::Part::bytes(image.to_vec()).file_name("image");
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DrapeError::provider(format!("{}: request failed: {e}", self.label)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DrapeError::provider(format!(
                "{}: non-success status {status}",
                self.label
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| DrapeError::provider(format!("{}: read body: {e}", self.label)))?;
        let depth = image::load_from_memory(&body).map_err(|e| {
            DrapeError::provider(format!("{}: malformed depth payload: {e}", self.label))
        })?;
        if depth.width() == 0 || depth.height() == 0 {
            return Err(DrapeError::provider(format!(
                "{}: empty depth payload",
                self.label
            )));
        }
        Ok(depth)
    }
}

impl DepthEstimator for HttpDepthEstimator {
    fn label(&self) -> &str {
        &self.label
    }

    fn estimate<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, DrapeResult<image::DynamicImage>> {
        Box::pin(self.request(image))
    }
}

/// Ordered chain of estimators backed by a local generator that cannot fail.
#[derive(Default)]
pub struct DepthProvider {
    estimators: Vec<Box<dyn DepthEstimator>>,
}

impl DepthProvider {
    pub fn new(estimators: Vec<Box<dyn DepthEstimator>>) -> Self {
        Self { estimators }
    }

    pub fn from_configs(configs: &[ProviderConfig]) -> DrapeResult<Self> {
        let mut estimators: Vec<Box<dyn DepthEstimator>> = Vec::with_capacity(configs.len());
        for cfg in configs {
            estimators.push(Box::new(HttpDepthEstimator::new(cfg)?));
        }
        Ok(Self::new(estimators))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.estimators.iter().map(|e| e.label()).collect()
    }

    /// Try every estimator in order; any failure moves on to the next one. When all of them
    /// fail the schematic fallback is returned, so this never errors.
    #[tracing::instrument(skip_all, fields(w = source.width(), h = source.height()))]
    pub async fn get_depth_map(&self, source: &SourceImage) -> RawDepth {
        for est in &self.estimators {
            match est.estimate(&source.bytes).await {
                Ok(image) => {
                    tracing::info!(method = est.label(), "depth estimated");
                    return RawDepth {
                        image,
                        method: est.label().to_string(),
                    };
                }
                Err(err) => {
                    tracing::warn!(method = est.label(), %err, "depth provider failed");
                }
            }
        }

        tracing::info!("all depth providers failed; using local fallback");
        RawDepth {
            image: image::DynamicImage::ImageLuma8(synthesize_garment_depth(
                source.width(),
                source.height(),
            )),
            method: FALLBACK_METHOD.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    struct Failing {
        calls: Arc<AtomicUsize>,
    }

    impl DepthEstimator for Failing {
        fn label(&self) -> &str {
            "failing"
        }

        fn estimate<'a>(
            &'a self,
            _image: &'a [u8],
        ) -> BoxFuture<'a, DrapeResult<image::DynamicImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(DrapeError::provider("503")) })
        }
    }

    struct Flat {
        label: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl DepthEstimator for Flat {
        fn label(&self) -> &str {
            self.label
        }

        fn estimate<'a>(
            &'a self,
            _image: &'a [u8],
        ) -> BoxFuture<'a, DrapeResult<image::DynamicImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                Ok(image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
                    4,
                    4,
                    image::Luma([9]),
                )))
            })
        }
    }

    fn source(w: u32, h: u32) -> SourceImage {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        let png = crate::assets::decode::encode_png_rgba8(img.as_raw(), w, h).unwrap();
        SourceImage::from_bytes(png).unwrap()
    }

    #[tokio::test]
    async fn first_success_wins_in_priority_order() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let provider = DepthProvider::new(vec![
            Box::new(Failing {
                calls: failing_calls.clone(),
            }),
            Box::new(Flat {
                label: "first",
                calls: first_calls.clone(),
            }),
            Box::new(Flat {
                label: "second",
                calls: second_calls.clone(),
            }),
        ]);

        let depth = provider.get_depth_map(&source(8, 8)).await;
        assert_eq!(depth.method, "first");
        assert_eq!(depth.image.width(), 4);
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_falls_back_to_schematic() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = DepthProvider::new(vec![
            Box::new(Failing {
                calls: calls.clone(),
            }),
            Box::new(Failing {
                calls: calls.clone(),
            }),
        ]);

        let depth = provider.get_depth_map(&source(20, 30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(depth.method, FALLBACK_METHOD);
        assert_eq!((depth.image.width(), depth.image.height()), (20, 30));
    }

    #[tokio::test]
    async fn unreachable_http_provider_falls_back() {
        let provider = DepthProvider::from_configs(&[ProviderConfig {
            label: "local-zoe".to_string(),
            endpoint: "http://127.0.0.1:9/generate-depth".to_string(),
            timeout_ms: 2_000,
        }])
        .unwrap();
        assert_eq!(provider.labels(), vec!["local-zoe"]);

        let depth = provider.get_depth_map(&source(6, 6)).await;
        assert_eq!(depth.method, FALLBACK_METHOD);
    }

    #[tokio::test]
    async fn empty_chain_uses_fallback() {
        let depth = DepthProvider::default().get_depth_map(&source(5, 7)).await;
        assert_eq!(depth.method, FALLBACK_METHOD);
        assert_eq!((depth.image.width(), depth.image.height()), (5, 7));
    }
}
