//! # OpenRaster
//!
//! A zip archive holding the layer tree as `stack.xml`, a PNG per painting layer, and rendered
//! previews, the merged one flattened onto white. Entries are written uncompressed, `mimetype`
//! first so the format can be sniffed.
//!
//! Layer offsets are relative to the effective bbox, so a framed document reloads with its frame
//! at the origin.

use std::{
    borrow::Cow,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use az::Az;

use super::{
    raster::{encode_png, flatten_onto_white},
    write_via_tempfile, CodecError, LoadOptions, SaveOptions,
};
use crate::{
    blend::BlendMode,
    document::Document,
    state::{
        frame::{Frame, Resolution},
        layers::{LayerKind, LayerNode, LayerPath, LayerStack},
    },
    surface::{Pixel, TiledSurface},
    util::Rect,
};

const MIMETYPE: &str = "image/openraster";
const VERSION: &str = "0.0.4-pre.1";
/// For our extensions to the format.
const NAMESPACE: &str = "urn:paintdoc:openraster";

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Just enough XML writing for `stack.xml`.
struct XmlWriter {
    out: String,
    depth: usize,
}
impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::from("<?xml version='1.0' encoding='UTF-8'?>\n"),
            depth: 0,
        }
    }
    fn start(&mut self, tag: &str, attributes: &[(&str, Cow<'_, str>)], empty: bool) {
        use std::fmt::Write;
        let indent = "  ".repeat(self.depth);
        // Writing to a String can't fail.
        let _ = write!(self.out, "{indent}<{tag}");
        for (name, value) in attributes {
            let _ = write!(self.out, " {name}=\"{}\"", escape(value));
        }
        if empty {
            self.out.push_str(" />\n");
        } else {
            self.out.push_str(">\n");
            self.depth += 1;
        }
    }
    fn end(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        let indent = "  ".repeat(self.depth);
        self.out.push_str(&format!("{indent}</{tag}>\n"));
    }
}

fn color_to_hex([r, g, b, a]: Pixel) -> String {
    format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
}
fn color_from_hex(hex: &str) -> Option<Pixel> {
    let hex = hex.trim().strip_prefix('#')?;
    if !hex.is_ascii() || !matches!(hex.len(), 6 | 8) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok();
    let alpha = if hex.len() == 8 { channel(3)? } else { 255 };
    Some([channel(0)?, channel(1)?, channel(2)?, alpha])
}

/// A painting layer's pixels, to be written once `stack.xml` is.
struct PendingLayer<'a> {
    src: String,
    surface: &'a TiledSurface,
    rect: Rect,
}

struct StackWriter<'a> {
    xml: XmlWriter,
    pending: Vec<PendingLayer<'a>>,
    current: Option<&'a LayerPath>,
    origin: (i32, i32),
}
impl<'a> StackWriter<'a> {
    fn write_nodes(&mut self, nodes: &'a [LayerNode], path: &mut LayerPath) {
        for (idx, node) in nodes.iter().enumerate() {
            path.push(idx);
            self.write_node(node, path);
            path.pop();
        }
    }
    fn write_node(&mut self, node: &'a LayerNode, path: &LayerPath) {
        let mut attributes: Vec<(&str, Cow<'_, str>)> = vec![
            ("name", node.name.as_str().into()),
            (
                "visibility",
                if node.visible { "visible" } else { "hidden" }.into(),
            ),
            ("opacity", format!("{:.3}", node.opacity).into()),
            ("composite-op", node.mode.composite_op().into()),
            ("locked", if node.locked { "true" } else { "false" }.into()),
        ];
        if self.current == Some(path) {
            attributes.push(("selected", "true".into()));
        }
        match &node.kind {
            LayerKind::Group(children) => {
                attributes.extend([("x", "0".into()), ("y", "0".into())]);
                self.xml.start("stack", &attributes, false);
                let mut path = path.clone();
                self.write_nodes(children, &mut path);
                self.xml.end("stack");
            }
            LayerKind::SolidColor(color) => {
                attributes.extend([
                    ("x", "0".into()),
                    ("y", "0".into()),
                    ("paintdoc:solid-color", color_to_hex(*color).into()),
                ]);
                self.xml.start("layer", &attributes, true);
            }
            LayerKind::Painting(surface) => {
                let mut rect = surface.bbox();
                if rect.is_empty() {
                    // PNGs can't be empty.
                    rect = Rect::new(self.origin.0, self.origin.1, 1, 1);
                }
                let src = format!("data/{:03}.png", self.pending.len() + 1);
                attributes.extend([
                    ("x", (rect.x - self.origin.0).to_string().into()),
                    ("y", (rect.y - self.origin.1).to_string().into()),
                    ("src", src.clone().into()),
                ]);
                self.xml.start("layer", &attributes, true);
                self.pending.push(PendingLayer { src, surface, rect });
            }
        }
    }
}

pub(super) fn save(
    document: &mut Document,
    path: &Path,
    _options: &SaveOptions,
) -> Result<Option<image::RgbaImage>, CodecError> {
    let effective = document.effective_bbox();
    let export = document.export_rect();
    let thumbnail = document.render_thumbnail(document.options().thumbnail_size);
    // Layer PNGs pass through here on the way into the archive. Removed on drop, on any path.
    let scratch = tempfile::Builder::new().prefix("paintdoc-ora-").tempdir()?;
    let layers = document.layers();

    let mut writer = StackWriter {
        xml: XmlWriter::new(),
        pending: Vec::new(),
        current: layers.current_path(),
        origin: (export.x, export.y),
    };
    let mut image_attributes: Vec<(&str, Cow<'_, str>)> = vec![
        ("w", effective.w.max(0).to_string().into()),
        ("h", effective.h.max(0).to_string().into()),
    ];
    if let Some(res) = document.stored_resolution() {
        image_attributes.extend([
            ("xres", res.xres.to_string().into()),
            ("yres", res.yres.to_string().into()),
        ]);
    }
    image_attributes.extend([
        ("version", VERSION.into()),
        ("xmlns:paintdoc", NAMESPACE.into()),
    ]);
    writer.xml.start("image", &image_attributes, false);
    writer.xml.start("stack", &[], false);
    writer.write_nodes(layers.children(), &mut LayerPath::new());
    writer.xml.end("stack");
    writer.xml.end("image");
    let StackWriter { xml, pending, .. } = writer;

    let mut merged = layers.render_rgba(export);
    flatten_onto_white(&mut merged);
    write_via_tempfile(path, |file| {
        let stored = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE.as_bytes())?;
        zip.start_file("stack.xml", stored)?;
        zip.write_all(xml.out.as_bytes())?;
        log::trace!("stack.xml:\n{}", xml.out);

        let mut add_png = |name: &str, image: &image::RgbaImage| -> Result<(), CodecError> {
            let mut temp = tempfile::tempfile_in(scratch.path())?;
            {
                let mut out = BufWriter::new(&mut temp);
                encode_png(image, None, &mut out)?;
                out.flush()?;
            }
            temp.rewind()?;
            zip.start_file(name, stored)?;
            let size = std::io::copy(&mut temp, &mut zip)?;
            log::debug!("wrote {name} ({})", human_bytes::human_bytes(size.az::<f64>()));
            Ok(())
        };
        for layer in &pending {
            add_png(&layer.src, &layer.surface.render_rgba(layer.rect))?;
        }
        add_png("Thumbnails/thumbnail.png", &thumbnail)?;
        add_png("mergedimage.png", &merged)?;
        zip.finish()?;
        Ok(())
    })?;
    scratch.close()?;
    Ok(Some(thumbnail))
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> zip::result::ZipResult<Vec<u8>> {
    let mut entry = archive.by_name(name)?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

struct StackReader<'o, R> {
    archive: zip::ZipArchive<R>,
    options: &'o LoadOptions,
    selected: Option<LayerPath>,
}
impl<R: Read + Seek> StackReader<'_, R> {
    fn read_png(&mut self, src: &str, x: i32, y: i32) -> Result<TiledSurface, CodecError> {
        use image::ImageDecoder;
        let data = read_entry(&mut self.archive, src)?;
        let decoder = image::codecs::png::PngDecoder::new(std::io::Cursor::new(data.as_slice()))?;
        let (width, height) = decoder.dimensions();
        self.options.check_size(width, height)?;
        let image = image::DynamicImage::from_decoder(decoder)?.into_rgba8();
        let mut surface = TiledSurface::new();
        surface.load_rgba(x, y, &image);
        Ok(surface)
    }
    /// Children of a `<stack>`, top first.
    fn read_stack(
        &mut self,
        stack: roxmltree::Node<'_, '_>,
        path: &mut LayerPath,
        (ox, oy): (i32, i32),
    ) -> Result<Vec<LayerNode>, CodecError> {
        let elements = stack.children().filter(|child| {
            let known = child.has_tag_name("layer") || child.has_tag_name("stack");
            if child.is_element() && !known {
                log::debug!("skipping <{}>", child.tag_name().name());
            }
            child.is_element() && known
        });
        let mut nodes = Vec::new();
        for (idx, element) in elements.enumerate() {
            path.push(idx);
            let x = ox + element.attribute("x").and_then(parse_int).unwrap_or(0);
            let y = oy + element.attribute("y").and_then(parse_int).unwrap_or(0);
            let mut node = if element.has_tag_name("stack") {
                let name = element.attribute("name").unwrap_or("Group");
                let children = self.read_stack(element, path, (x, y))?;
                LayerNode::group(name, children)
            } else {
                let name = element.attribute("name").unwrap_or("Layer");
                if let Some(color) = element.attribute((NAMESPACE, "solid-color")) {
                    let color = color_from_hex(color).ok_or_else(|| {
                        CodecError::Structure(format!("Bad solid colour {color:?}"))
                    })?;
                    LayerNode::solid_color(name, color)
                } else if let Some(src) = element.attribute("src") {
                    LayerNode::with_surface(name, self.read_png(src, x, y)?)
                } else {
                    LayerNode::painting(name)
                }
            };
            node.visible = element.attribute("visibility") != Some("hidden");
            node.locked = element.attribute("locked") == Some("true");
            node.opacity = element
                .attribute("opacity")
                .and_then(|o| o.trim().parse::<f32>().ok())
                .filter(|o| o.is_finite())
                .map_or(1.0, |o| o.clamp(0.0, 1.0));
            if let Some(op) = element.attribute("composite-op") {
                node.mode = BlendMode::from_composite_op(op);
            }
            if element.attribute("selected") == Some("true") {
                self.selected = Some(path.clone());
            }
            nodes.push(node);
            path.pop();
        }
        Ok(nodes)
    }
}

fn parse_int(value: &str) -> Option<i32> {
    value.trim().parse().ok()
}

pub(super) fn load(
    document: &mut Document,
    path: &Path,
    options: &LoadOptions,
) -> Result<(), CodecError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    match read_entry(&mut archive, "mimetype") {
        Ok(mimetype) => log::debug!("mimetype: {:?}", String::from_utf8_lossy(&mimetype).trim()),
        Err(zip::result::ZipError::FileNotFound) => log::warn!("archive has no mimetype"),
        Err(e) => return Err(e.into()),
    }
    let xml = match read_entry(&mut archive, "stack.xml") {
        Ok(xml) => xml,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(CodecError::Structure(
                "Not an OpenRaster file: stack.xml is missing".to_owned(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let xml = String::from_utf8(xml)
        .map_err(|_| CodecError::Structure("stack.xml is not UTF-8".to_owned()))?;
    let xml = roxmltree::Document::parse(&xml)?;
    let image = xml.root_element();
    if !image.has_tag_name("image") {
        return Err(CodecError::Structure(format!(
            "Unexpected root element <{}> in stack.xml",
            image.tag_name().name()
        )));
    }
    let dimension = |name: &str| image.attribute(name).and_then(parse_int).unwrap_or(0).max(0);
    let (width, height) = (dimension("w"), dimension("h"));
    // Zero or absent means unspecified. Both are needed.
    let resolution = Resolution::new(
        image.attribute("xres").and_then(|r| r.trim().parse().ok()).unwrap_or(0),
        image.attribute("yres").and_then(|r| r.trim().parse().ok()).unwrap_or(0),
    );

    let mut reader = StackReader {
        archive,
        options,
        selected: None,
    };
    let children = match image.children().find(|child| child.has_tag_name("stack")) {
        Some(stack) => reader.read_stack(stack, &mut LayerPath::new(), (0, 0))?,
        None => Vec::new(),
    };
    let mut layers = LayerStack::from_children(children);
    if layers.is_empty() {
        if !document.options().create_layer_if_empty {
            return Err(CodecError::Structure(
                "The file contains no layers".to_owned(),
            ));
        }
        log::info!("no layers in file, adding a blank one");
        layers = LayerStack::from_children(vec![LayerNode::painting("Layer 1")]);
    }
    if let Some(selected) = &reader.selected {
        layers.set_current_path(Some(selected.as_slice()));
    }

    // Documents saved without a frame load without one.
    let rect = Rect::new(0, 0, width, height);
    let bbox = layers.bbox();
    let enabled = !(rect == bbox || rect.is_empty() || bbox.is_empty());
    document.replace_contents(layers, Frame { rect, enabled }, resolution);
    Ok(())
}
