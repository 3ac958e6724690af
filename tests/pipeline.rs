//! End-to-end tests against the real codec backend.
//!
//! Sources are synthetic images written to a temp dir, so nothing here needs
//! network access or fixture files.

use image::{ImageEncoder, RgbImage};
use imgset::imaging::BackendError;
use imgset::{
    Format, ImageConfig, ImagePipeline, Options, RustBackend, VariantPlan, VariantSpec, Width,
    predict_by_dimensions,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const LOGO_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="60" viewBox="0 0 120 60"><circle cx="60" cy="30" r="25" fill="#2a6"/></svg>"##;

fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    let file = std::fs::File::create(path).unwrap();
    image::codecs::jpeg::JpegEncoder::new(std::io::BufWriter::new(file))
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

fn options(out: &Path, widths: Vec<Width>, formats: &[&str]) -> Options {
    Options::new(ImageConfig {
        widths,
        formats: formats.iter().map(|f| f.parse().unwrap()).collect(),
        output_dir: out.to_path_buf(),
        url_path: "/media/".into(),
        ..ImageConfig::default()
    })
}

fn without_sizes(plan: &VariantPlan) -> Vec<VariantSpec> {
    plan.variants()
        .cloned()
        .map(|mut v| {
            v.size = None;
            v
        })
        .collect()
}

#[tokio::test]
async fn raster_source_generates_every_variant() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("photo.jpg");
    write_jpeg(&src, 200, 150);
    let out = tmp.path().join("img");
    let opts = options(&out, vec![Width::Intrinsic, Width::Px(100)], &["webp", "jpeg", "png"]);

    let pipeline = ImagePipeline::new().unwrap();
    let plan = pipeline.generate(src.as_path(), &opts).await.unwrap();

    assert_eq!(
        plan.formats().collect::<Vec<_>>(),
        vec![Format::Webp, Format::Jpeg, Format::Png]
    );
    assert_eq!(plan.len(), 6);
    for spec in plan.variants() {
        let written = std::fs::metadata(&spec.output_path).unwrap().len();
        assert_eq!(spec.size, Some(written), "{}", spec.filename);
        assert_eq!(
            image::image_dimensions(&spec.output_path).unwrap(),
            (spec.width, spec.height),
            "{}",
            spec.filename
        );
        assert!(spec.url.starts_with("/media/"));
    }

    let widths: Vec<u32> = plan.get(Format::Jpeg).unwrap().iter().map(|v| v.width).collect();
    assert_eq!(widths, vec![100, 200]);
}

#[tokio::test]
async fn prediction_matches_generation() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("photo.jpg");
    write_jpeg(&src, 320, 240);
    let opts = options(
        &tmp.path().join("img"),
        vec![Width::Px(160), Width::Intrinsic, Width::Px(1000)],
        &["auto", "webp"],
    );
    let pipeline = ImagePipeline::new().unwrap();
    let identity = src.to_string_lossy().into_owned();

    let probed = pipeline.predict_by_probing(&src, &opts).unwrap();
    let by_dimensions = {
        let mut opts = opts.clone();
        opts.config.override_input_format = Some(Format::Jpeg);
        predict_by_dimensions(&identity, 320, 240, &opts).unwrap()
    };
    let generated = pipeline.generate(src.as_path(), &opts).await.unwrap();

    assert_eq!(probed, by_dimensions);
    assert_eq!(without_sizes(&generated), without_sizes(&probed));
    // 1000 exceeds the source and is dropped
    assert_eq!(generated.get(Format::Webp).unwrap().len(), 2);
}

#[tokio::test]
async fn wide_short_source_keeps_a_one_pixel_height() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("strip.jpg");
    write_jpeg(&src, 1000, 1);
    let opts = options(&tmp.path().join("img"), vec![Width::Intrinsic, Width::Px(400)], &["webp"]);

    let planned = {
        let mut opts = opts.clone();
        opts.config.override_input_format = Some(Format::Jpeg);
        predict_by_dimensions(&src.to_string_lossy(), 1000, 1, &opts).unwrap()
    };
    let sizes: Vec<_> = planned.variants().map(|v| (v.width, v.height)).collect();
    assert_eq!(sizes, vec![(400, 1), (1000, 1)]);

    let plan = ImagePipeline::new()
        .unwrap()
        .generate(src.as_path(), &opts)
        .await
        .unwrap();
    for spec in plan.variants() {
        assert_eq!(
            image::image_dimensions(&spec.output_path).unwrap(),
            (spec.width, 1)
        );
    }
}

#[tokio::test]
async fn svg_short_circuit_copies_the_source() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("logo.svg");
    std::fs::write(&src, LOGO_SVG).unwrap();
    let out = tmp.path().join("img");
    let mut opts = options(&out, vec![Width::Intrinsic, Width::Px(240)], &["webp", "svg"]);
    opts.config.svg_short_circuit = true;

    let plan = ImagePipeline::new()
        .unwrap()
        .generate(src.as_path(), &opts)
        .await
        .unwrap();

    assert_eq!(plan.formats().collect::<Vec<_>>(), vec![Format::Svg]);
    let spec = &plan.get(Format::Svg).unwrap()[0];
    assert_eq!(std::fs::read_to_string(&spec.output_path).unwrap(), LOGO_SVG);
    assert_eq!(spec.size, Some(LOGO_SVG.len() as u64));
    assert_eq!((spec.width, spec.height), (120, 60));
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
}

#[tokio::test]
async fn svg_buffer_is_rasterized_and_upscaled() {
    let tmp = TempDir::new().unwrap();
    let opts = options(
        &tmp.path().join("img"),
        vec![Width::Intrinsic, Width::Px(240)],
        &["png", "svg"],
    )
    .with_source_identity("brand/logo");

    let plan = ImagePipeline::new()
        .unwrap()
        .generate(LOGO_SVG.as_bytes().to_vec(), &opts)
        .await
        .unwrap();

    assert_eq!(plan.formats().collect::<Vec<_>>(), vec![Format::Svg, Format::Png]);
    let png = plan.get(Format::Png).unwrap();
    assert_eq!((png[1].width, png[1].height), (240, 120));
    assert_eq!(image::image_dimensions(&png[1].output_path).unwrap(), (240, 120));
    assert_eq!(
        std::fs::read(&plan.get(Format::Svg).unwrap()[0].output_path).unwrap(),
        LOGO_SVG.as_bytes()
    );
}

#[tokio::test]
async fn format_hook_can_reuse_stock_encoder() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("photo.jpg");
    write_jpeg(&src, 64, 64);
    let opts = options(&tmp.path().join("img"), vec![Width::Intrinsic], &["jpeg"]).with_format_hook(
        Format::Jpeg,
        Arc::new(|img: &image::DynamicImage| -> Result<Vec<u8>, BackendError> {
            let gray = image::DynamicImage::ImageLuma8(img.to_luma8());
            RustBackend::encode(&gray, Format::Jpeg, &Default::default())
        }),
    );

    let plan = ImagePipeline::new()
        .unwrap()
        .generate(src.as_path(), &opts)
        .await
        .unwrap();

    let spec = &plan.get(Format::Jpeg).unwrap()[0];
    let decoded = image::open(&spec.output_path).unwrap();
    assert_eq!(decoded.color(), image::ColorType::L8);
}

#[tokio::test]
async fn many_sources_through_a_small_queue() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("img");
    let opts = options(&out, vec![Width::Intrinsic, Width::Px(32)], &["webp"]);
    let pipeline = ImagePipeline::new().unwrap();
    pipeline.set_concurrency(2);

    let sources: Vec<_> = (0..6)
        .map(|i| {
            let path = tmp.path().join(format!("photo-{i}.jpg"));
            write_jpeg(&path, 64 + i, 48);
            path
        })
        .collect();

    let handles: Vec<_> = sources
        .into_iter()
        .map(|path| {
            let pipeline = pipeline.clone();
            let opts = opts.clone();
            tokio::spawn(async move { pipeline.generate(path, &opts).await })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap().unwrap().len();
    }
    assert_eq!(total, 12);
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 12);
    assert_eq!(pipeline.queue().pending(), 0);
}

#[tokio::test]
async fn undecodable_source_fails_the_job() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("broken.jpg");
    std::fs::write(&src, b"definitely not a jpeg").unwrap();
    let opts = options(&tmp.path().join("img"), vec![Width::Intrinsic], &["webp"]);

    let result = ImagePipeline::new().unwrap().generate(src.as_path(), &opts).await;
    assert!(matches!(result, Err(imgset::ImageError::Codec(_))));
}
