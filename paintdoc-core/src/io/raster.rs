//! Flat raster formats, holding either the merged image or one layer per file.

use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use az::SaturatingAs;

use super::{
    check_readable, loading_error, write_via_tempfile, CodecError, LoadOptions, SaveLoadError,
    SaveOptions,
};
use crate::{document::Document, state::layers::LayerError, util::Rect};

/// Encode straight RGBA8 as PNG. `resolution` is in pixels per inch.
pub(crate) fn encode_png(
    image: &image::RgbaImage,
    resolution: Option<u32>,
    w: impl Write,
) -> Result<(), CodecError> {
    let mut encoder = png::Encoder::new(w, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    if let Some(dpi) = resolution {
        // PNG counts pixels per meter.
        let ppm: u32 = (f64::from(dpi) / 0.0254).round().saturating_as();
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: ppm,
            yppu: ppm,
            unit: png::Unit::Meter,
        }));
    }
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())?;
    writer.finish()?;
    Ok(())
}

pub(crate) fn write_png_file(image: &image::RgbaImage, path: &Path) -> Result<(), SaveLoadError> {
    write_via_tempfile(path, |file| {
        let mut out = BufWriter::new(file);
        encode_png(image, None, &mut out)?;
        out.flush()?;
        Ok(())
    })
    .map_err(super::saving_error)
}

fn decode(path: &Path, options: &LoadOptions) -> Result<image::RgbaImage, CodecError> {
    let (width, height) = image::image_dimensions(path)?;
    options.check_size(width, height)?;
    Ok(image::open(path)?.to_rgba8())
}

/// Decode any supported raster file.
pub fn read_rgba(path: &Path) -> Result<image::RgbaImage, SaveLoadError> {
    check_readable(path)?;
    decode(path, &LoadOptions::default()).map_err(loading_error)
}

/// Composite over opaque white, for formats and previews without transparency.
pub(super) fn flatten_onto_white(image: &mut image::RgbaImage) {
    for pixel in image.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let a = u16::from(a);
        let over = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255).saturating_as::<u8>();
        pixel.0 = [over(r), over(g), over(b), 255];
    }
}

/// `name.003.png` becomes `name`, so re-saving a numbered export doesn't stack numbers.
fn numbered_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.rsplit_once('.') {
        Some((prefix, number))
            if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) =>
        {
            prefix.to_owned()
        }
        _ => stem,
    }
}

fn layer_file_paths(path: &Path, count: usize) -> Vec<PathBuf> {
    let stem = numbered_stem(path);
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    (1..=count)
        .map(|n| path.with_file_name(format!("{stem}.{n:03}.{ext}")))
        .collect()
}

pub(super) fn save_png(
    document: &mut Document,
    path: &Path,
    options: &SaveOptions,
) -> Result<Option<image::RgbaImage>, CodecError> {
    let rect = document.export_rect();
    let resolution = document.stored_resolution().map(|res| res.effective());
    if options.multifile {
        let layers = document.layers();
        let paths = layer_file_paths(path, layers.deep_len());
        for (layer, path) in layers.deepiter().zip(&paths) {
            let image = layer.flatten(rect).render_rgba(rect);
            write_via_tempfile(path, |file| {
                let mut out = BufWriter::new(file);
                encode_png(&image, resolution, &mut out)?;
                out.flush()?;
                Ok(())
            })?;
            log::debug!("wrote layer {:?} to {}", layer.name, path.display());
        }
        return Ok(None);
    }
    let mut image = document.layers().render_rgba(rect);
    if !options.alpha {
        flatten_onto_white(&mut image);
    }
    write_via_tempfile(path, |file| {
        let mut out = BufWriter::new(file);
        encode_png(&image, resolution, &mut out)?;
        out.flush()?;
        Ok(None)
    })
}

pub(super) fn save_jpeg(
    document: &mut Document,
    path: &Path,
    options: &SaveOptions,
) -> Result<Option<image::RgbaImage>, CodecError> {
    let mut image = document.layers().render_rgba(document.export_rect());
    flatten_onto_white(&mut image);
    let image = image::DynamicImage::ImageRgba8(image).into_rgb8();
    let quality = options
        .jpeg_quality
        .unwrap_or(document.options().jpeg_quality)
        .clamp(1, 100);
    let resolution = document.stored_resolution().map(|res| res.effective());
    write_via_tempfile(path, |file| {
        let mut out = BufWriter::new(file);
        {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
            if let Some(dpi) = resolution {
                encoder.set_pixel_density(image::codecs::jpeg::PixelDensity::dpi(
                    dpi.saturating_as(),
                ));
            }
            encoder.encode_image(&image)?;
        }
        out.flush()?;
        Ok(None)
    })
}

/// Replace the document with a single layer holding the image. The frame is set to the image,
/// but left disabled.
pub(super) fn load(
    document: &mut Document,
    path: &Path,
    options: &LoadOptions,
) -> Result<(), CodecError> {
    let image = decode(path, options)?;
    document.clear();
    if document.layers().is_empty() {
        let name = document.new_layer_name();
        document.add_layer(&[0], crate::state::layers::LayerNode::painting(name))?;
    }
    document.load_layer_from_rgba(&image, 0, 0)?;
    let rect = Rect::new(0, 0, image.width().saturating_as(), image.height().saturating_as());
    document
        .set_frame(rect, false)
        .map_err(LayerError::from)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        document::DocumentOptions,
        state::layers::LayerNode,
        surface::TILE_SIZE,
    };

    fn painted() -> Document {
        let mut doc = Document::default();
        doc.stroke_surface(|surface| {
            let rect = Rect::new(0, 0, 4, 4);
            surface.fill_rect(rect, [255, 0, 0, 255]);
            rect
        })
        .unwrap();
        doc
    }
    #[test]
    fn png_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut doc = painted();
        assert!(doc.save(&path, &SaveOptions::default()).unwrap().is_none());

        let mut loaded = Document::default();
        loaded.load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.layers().deep_len(), 1);
        let surface = loaded.layers().current().unwrap().surface().unwrap();
        assert_eq!(surface.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(surface.pixel(10, 10), [0, 0, 0, 0]);
        assert_eq!(loaded.frame(), Rect::new(0, 0, TILE_SIZE, TILE_SIZE));
        assert!(!loaded.frame_enabled());
        assert!(!loaded.history().can_undo());
    }
    #[test]
    fn png_without_alpha_is_white() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        let mut doc = painted();
        let options = SaveOptions {
            alpha: false,
            ..Default::default()
        };
        doc.save(&path, &options).unwrap();
        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(20, 20).0, [255, 255, 255, 255]);
    }
    #[test]
    fn png_records_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("res.png");
        let mut doc = painted();
        doc.set_resolution(Some(300));
        doc.save(&path, &SaveOptions::default()).unwrap();
        let decoder = png::Decoder::new(std::fs::File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let dims = reader.info().pixel_dims.unwrap();
        assert_eq!(dims.xppu, 11811);
        assert_eq!(dims.unit, png::Unit::Meter);
    }
    #[test]
    fn multifile_numbers_layers() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = painted();
        doc.add_layer(&[0], LayerNode::painting("top")).unwrap();
        let options = SaveOptions {
            multifile: true,
            ..Default::default()
        };
        // An existing number is replaced, not extended.
        doc.save(&dir.path().join("out.007.png"), &options).unwrap();
        assert!(dir.path().join("out.001.png").is_file());
        assert!(dir.path().join("out.002.png").is_file());
        assert!(!dir.path().join("out.007.png").exists());
        let bottom = image::open(dir.path().join("out.002.png")).unwrap().to_rgba8();
        assert_eq!(bottom.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }
    #[test]
    fn empty_jpeg_is_one_tile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.JPG");
        let mut doc = Document::default();
        doc.save(&path, &SaveOptions::default()).unwrap();
        let image = image::open(&path).unwrap();
        assert_eq!(image.width(), TILE_SIZE.unsigned_abs());
        assert_eq!(image.height(), TILE_SIZE.unsigned_abs());
    }
    #[test]
    fn size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        painted().save(&path, &SaveOptions::default()).unwrap();
        let mut doc = Document::default();
        let options = LoadOptions {
            max_pixels: Some(100),
        };
        let err = doc.load(&path, &options).unwrap_err();
        assert!(matches!(
            err,
            SaveLoadError::Codec {
                source: CodecError::TooLarge(64, 64),
                ..
            }
        ));
    }
    #[test]
    fn load_without_blank_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.png");
        painted().save(&path, &SaveOptions::default()).unwrap();
        let mut doc = Document::new(DocumentOptions {
            create_layer_if_empty: false,
            ..Default::default()
        });
        doc.load(&path, &LoadOptions::default()).unwrap();
        assert_eq!(doc.layers().deep_len(), 1);
    }
}
