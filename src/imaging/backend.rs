//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline needs
//! from a codec: identify (probe dimensions and format), prepare (decode and
//! optionally resize), and save (encode and write).
//!
//! `prepare` always returns a fresh image. Variants never share a decoded
//! handle, so they can be encoded in parallel without coordination.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate for rasters and `resvg` for SVG sources.

use super::params::{PrepareParams, SaveParams};
use crate::format::Format;
use crate::source::SourceInput;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// What probing a source reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    /// `None` when the container could not be recognized.
    pub format: Option<Format>,
    /// Encoded size in bytes. Known for SVG sources, which are copied verbatim.
    pub size: Option<u64>,
}

impl SourceMetadata {
    pub fn new(width: u32, height: u32, format: Option<Format>) -> Self {
        Self {
            width,
            height,
            format,
            size: None,
        }
    }

    pub fn is_svg(&self) -> bool {
        self.format == Some(Format::Svg)
    }
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across rayon workers and tokio tasks.
pub trait ImageBackend: Send + Sync {
    /// Probe dimensions and format without a full decode where possible.
    fn identify(&self, source: &SourceInput) -> Result<SourceMetadata, BackendError>;

    /// Decode the source into a new image, resized if requested.
    fn prepare(&self, params: &PrepareParams) -> Result<DynamicImage, BackendError>;

    /// Encode `image` and write it to `params.output`. Returns bytes written.
    fn save(&self, image: &DynamicImage, params: &SaveParams) -> Result<u64, BackendError>;
}

/// Custom encoder for one output format.
///
/// A registered hook replaces the backend's own encoder: it receives the
/// prepared image and returns the bytes to write. Any closure of the right
/// shape is a hook.
pub trait FormatHook: Send + Sync {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, BackendError>;
}

impl<F> FormatHook for F
where
    F: Fn(&DynamicImage) -> Result<Vec<u8>, BackendError> + Send + Sync,
{
    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>, BackendError> {
        self(image)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{EncodeOptions, Resize};
    use std::sync::Mutex;

    /// Size every mock save reports.
    pub const MOCK_SAVE_SIZE: u64 = 42;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub identify_results: Mutex<Vec<SourceMetadata>>,
        pub operations: Mutex<Vec<RecordedOp>>,
        /// Fail every save whose output path contains this string.
        pub fail_on: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Prepare {
            source: String,
            resize: Option<Resize>,
        },
        Save {
            output: String,
            format: Format,
            quality: Option<u32>,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_metadata(metadata: Vec<SourceMetadata>) -> Self {
            Self {
                identify_results: Mutex::new(metadata),
                ..Self::default()
            }
        }

        pub fn failing_on(pattern: &str) -> Self {
            Self {
                fail_on: Some(pattern.to_string()),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn saves(&self) -> Vec<RecordedOp> {
            self.get_operations()
                .into_iter()
                .filter(|op| matches!(op, RecordedOp::Save { .. }))
                .collect()
        }

        pub fn prepares(&self) -> Vec<RecordedOp> {
            self.get_operations()
                .into_iter()
                .filter(|op| matches!(op, RecordedOp::Prepare { .. }))
                .collect()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, source: &SourceInput) -> Result<SourceMetadata, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(source.identity.clone()));

            self.identify_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock metadata".to_string()))
        }

        fn prepare(&self, params: &PrepareParams) -> Result<DynamicImage, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Prepare {
                source: params.source.identity.clone(),
                resize: params.resize,
            });
            Ok(DynamicImage::new_rgba8(1, 1))
        }

        fn save(&self, _image: &DynamicImage, params: &SaveParams) -> Result<u64, BackendError> {
            let output = params.output.to_string_lossy().to_string();
            if let Some(pattern) = &self.fail_on
                && output.contains(pattern.as_str())
            {
                return Err(BackendError::ProcessingFailed(format!(
                    "mock failure for {output}"
                )));
            }
            self.operations.lock().unwrap().push(RecordedOp::Save {
                output,
                format: params.format,
                quality: params.options.quality,
            });
            Ok(MOCK_SAVE_SIZE)
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_metadata(vec![SourceMetadata::new(
            800,
            600,
            Some(Format::Jpeg),
        )]);

        let result = backend.identify(&SourceInput::file("/test/image.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/test/image.jpg"));
    }

    #[test]
    fn mock_identify_without_results_errors() {
        let backend = MockBackend::new();
        assert!(backend.identify(&SourceInput::file("a.png")).is_err());
    }

    #[test]
    fn mock_records_prepare_and_save() {
        let backend = MockBackend::new();
        let resize = Resize {
            width: 400,
            height: 300,
            without_enlargement: true,
        };

        let img = backend
            .prepare(&PrepareParams {
                source: SourceInput::file("/source.jpg"),
                resize: Some(resize),
            })
            .unwrap();
        let size = backend
            .save(
                &img,
                &SaveParams {
                    output: "/out/a-400.webp".into(),
                    format: Format::Webp,
                    options: EncodeOptions {
                        quality: Some(70),
                        speed: None,
                    },
                },
            )
            .unwrap();

        assert_eq!(size, MOCK_SAVE_SIZE);
        assert_eq!(
            backend.get_operations(),
            vec![
                RecordedOp::Prepare {
                    source: "/source.jpg".into(),
                    resize: Some(resize),
                },
                RecordedOp::Save {
                    output: "/out/a-400.webp".into(),
                    format: Format::Webp,
                    quality: Some(70),
                },
            ]
        );
    }

    #[test]
    fn closures_are_format_hooks() {
        let hook = |img: &DynamicImage| -> Result<Vec<u8>, BackendError> {
            Ok(vec![img.width() as u8; 3])
        };
        let bytes = FormatHook::encode(&hook, &DynamicImage::new_rgb8(7, 1)).unwrap();
        assert_eq!(bytes, vec![7, 7, 7]);
    }
}
