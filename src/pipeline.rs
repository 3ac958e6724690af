//! Public entry points.
//!
//! [`ImagePipeline`] ties the stages together for one source at a time:
//!
//! ```text
//! resolve source ──▶ identify ──▶ plan ──▶ generate
//!   (fetch URLs)     (backend)    (pure)   (rayon)
//! ```
//!
//! Every `generate` call is a job on the pipeline's [`JobQueue`], so many
//! sources can be submitted at once while at most `concurrency` are processed.
//! Decoding and encoding run on tokio's blocking pool.
//!
//! The prediction calls run the planner alone and never write files:
//! [`ImagePipeline::predict_by_probing`] reads a local file's dimensions and
//! [`predict_by_dimensions`] takes them from the caller. Both yield the same
//! filenames, URLs and dimensions that `generate` would.

use crate::config::{ConfigError, ImageConfig};
use crate::fetch::{FetchError, Fetcher, HttpFetcher};
use crate::format::Format;
use crate::generate::generate_variants;
use crate::imaging::{BackendError, FormatHook, ImageBackend, RustBackend, SourceMetadata};
use crate::naming::FilenameFormat;
use crate::plan::{VariantPlan, plan_variants};
use crate::queue::JobQueue;
use crate::source::{ImageSource, SourceInput, check_source, resolve_source};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to fetch source: {0}")]
    SourceFetch(#[from] FetchError),
    #[error("Image processing failed: {0}")]
    Codec(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Job aborted: {0}")]
    Aborted(String),
}

/// Per-call options: the config plus the hooks that cannot live in a file.
#[derive(Clone, Default)]
pub struct Options {
    pub config: ImageConfig,
    /// Custom naming rule. Falls back to the default when it returns `None`.
    pub filename_format: Option<FilenameFormat>,
    /// Custom encoders, consulted before the backend's own.
    pub format_hooks: BTreeMap<Format, Arc<dyn FormatHook>>,
    /// Identity for buffer sources, used to derive filenames.
    pub source_identity: Option<String>,
}

impl Options {
    pub fn new(config: ImageConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_filename_format(mut self, strategy: FilenameFormat) -> Self {
        self.filename_format = Some(strategy);
        self
    }

    pub fn with_format_hook(mut self, format: Format, hook: Arc<dyn FormatHook>) -> Self {
        self.format_hooks.insert(format, hook);
        self
    }

    pub fn with_source_identity(mut self, identity: impl Into<String>) -> Self {
        self.source_identity = Some(identity.into());
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("config", &self.config)
            .field("filename_format", &self.filename_format)
            .field("format_hooks", &self.format_hooks.keys().collect::<Vec<_>>())
            .field("source_identity", &self.source_identity)
            .finish()
    }
}

/// Plans and generates variants through a shared job queue.
///
/// Cloning is cheap and yields a handle to the same queue.
#[derive(Clone)]
pub struct ImagePipeline {
    backend: Arc<dyn ImageBackend>,
    fetcher: Arc<dyn Fetcher>,
    queue: JobQueue,
}

impl ImagePipeline {
    /// A pipeline with the stock backend, an HTTP fetcher and the default
    /// concurrency.
    pub fn new() -> Result<Self, ImageError> {
        Self::from_config(&ImageConfig::default())
    }

    /// Like [`new`](Self::new), with the queue sized by `config.concurrency`.
    pub fn from_config(config: &ImageConfig) -> Result<Self, ImageError> {
        Ok(Self::with_parts(
            Arc::new(RustBackend::new()),
            Arc::new(HttpFetcher::new()?),
            config.concurrency,
        ))
    }

    pub fn with_parts(
        backend: Arc<dyn ImageBackend>,
        fetcher: Arc<dyn Fetcher>,
        concurrency: usize,
    ) -> Self {
        Self {
            backend,
            fetcher,
            queue: JobQueue::new(concurrency),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.queue.concurrency()
    }

    /// Change how many jobs may run at once. Running jobs are unaffected.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.queue.set_concurrency(concurrency);
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Generate every variant of `src` and return the plan with sizes.
    ///
    /// `src` is a local path, an absolute URL, or an image buffer (which
    /// needs [`Options::source_identity`]). Configuration problems are
    /// reported before the job is queued.
    pub async fn generate(
        &self,
        src: impl Into<ImageSource>,
        options: &Options,
    ) -> Result<VariantPlan, ImageError> {
        let source = src.into();
        options.config.validate()?;
        let identity = options.source_identity.as_deref();
        check_source(&source, identity)?;
        tokio::fs::create_dir_all(&options.config.output_dir).await?;

        self.queue
            .run(async {
                let input =
                    resolve_source(source, identity, self.fetcher.as_ref(), &options.config.cache)
                        .await?;
                let backend = self.backend.clone();
                let options = options.clone();
                tokio::task::spawn_blocking(move || process(backend.as_ref(), &input, &options))
                    .await
                    .map_err(|e| ImageError::Aborted(e.to_string()))?
            })
            .await
    }

    /// Plan the variants of a local file without generating them.
    ///
    /// Raster files are identified from their header. SVG files are read and
    /// parsed in full to find their size, and their byte length is recorded.
    pub fn predict_by_probing(
        &self,
        path: impl AsRef<Path>,
        options: &Options,
    ) -> Result<VariantPlan, ImageError> {
        let input = SourceInput::file(path.as_ref());
        let metadata = probe(self.backend.as_ref(), &input, &options.config)?;
        plan_variants(&input.identity, &metadata, options)
    }
}

impl fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Plan variants from known dimensions. Performs no I/O.
///
/// The source format is taken from `override_input_format` when set, so
/// `"auto"` formats and SVG handling need it.
pub fn predict_by_dimensions(
    src: &str,
    width: u32,
    height: u32,
    options: &Options,
) -> Result<VariantPlan, ImageError> {
    if src.trim().is_empty() {
        return Err(ImageError::Configuration("`src` is required".into()));
    }
    let metadata = SourceMetadata::new(width, height, options.config.override_input_format);
    plan_variants(src, &metadata, options)
}

/// Identify a source, filling in its size when it will be copied verbatim.
fn probe(
    backend: &dyn ImageBackend,
    input: &SourceInput,
    config: &ImageConfig,
) -> Result<SourceMetadata, ImageError> {
    let mut metadata = backend.identify(input)?;
    if metadata.format.is_none() {
        metadata.format = config.override_input_format;
    }
    if metadata.is_svg() && metadata.size.is_none() {
        metadata.size = Some(input.byte_len()?);
    }
    Ok(metadata)
}

/// One job's blocking half: identify, plan, write.
fn process(
    backend: &dyn ImageBackend,
    input: &SourceInput,
    options: &Options,
) -> Result<VariantPlan, ImageError> {
    let metadata = probe(backend, input, &options.config)?;
    let plan = plan_variants(&input.identity, &metadata, options)?;
    let plan = generate_variants(backend, input, &metadata, plan, options)?;
    info!(
        src = %input.identity,
        width = metadata.width,
        height = metadata.height,
        variants = plan.len(),
        "Generated image variants"
    );
    Ok(plan)
}
