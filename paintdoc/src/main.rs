//! Command-line access to paintdoc documents.

mod settings;

use anyhow::{bail, Result as AnyResult};
use clap::{Parser, Subcommand};
use paintdoc_core::{
    document::Document,
    io::{LoadOptions, SaveOptions},
    state::layers::{LayerKind, LayerNode},
    util::Rect,
};
use std::path::{Path, PathBuf};

/// Inspect, convert, and create paintdoc documents
#[derive(Parser, Debug)]
#[command(name = "paintdoc", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the frame, resolution, and layer tree of each file
    Info {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Load a document and save it in the format named by the output's extension
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// For PNG, save one numbered file per layer
        #[arg(long)]
        multifile: bool,
        /// Flatten onto white even when the format keeps transparency
        #[arg(long)]
        flat: bool,
        /// JPEG quality
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: Option<u8>,
    },
    /// Save an empty document
    New {
        output: PathBuf,
        /// Frame size, written <w>x<h>
        #[arg(long, value_parser = parse_size)]
        size: Option<(i32, i32)>,
        /// Pixels per inch
        #[arg(long)]
        resolution: Option<u32>,
    },
    /// Write the settings file if missing, and print its path
    Settings,
}

fn parse_size(size: &str) -> Result<(i32, i32), String> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| format!("expected <w>x<h>, got {size:?}"))?;
    let parse = |v: &str| match v.trim().parse::<i32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(format!("bad dimension {v:?}")),
    };
    Ok((parse(w)?, parse(h)?))
}

fn describe(node: &LayerNode) -> String {
    let kind = match &node.kind {
        LayerKind::Painting(surface) => format!("painting, {}", surface.bbox()),
        LayerKind::SolidColor([r, g, b, a]) => format!("solid #{r:02x}{g:02x}{b:02x}{a:02x}"),
        LayerKind::Group(children) => format!("group of {}", children.len()),
    };
    let mut flags = String::new();
    if !node.visible {
        flags.push_str(" hidden");
    }
    if node.locked {
        flags.push_str(" locked");
    }
    format!(
        "{:?} ({kind}) {} {:.0}%{flags}",
        node.name,
        node.mode.as_ref(),
        node.opacity * 100.0
    )
}

fn info(paths: &[PathBuf], settings: &settings::Settings) -> AnyResult<()> {
    let mut failures = 0usize;
    for path in paths {
        let mut document = Document::new(settings.document.clone());
        if let Err(e) = document.load(path, &LoadOptions::default()) {
            log::error!("failed to open file {path:?}: {e:#}");
            failures += 1;
            continue;
        }
        println!("{}", path.display());
        println!("  bbox: {}", document.bbox());
        let frame = if document.frame_enabled() {
            document.frame().to_string()
        } else {
            "disabled".to_owned()
        };
        println!("  frame: {frame}");
        println!("  resolution: {} ppi", document.resolution());
        let current = document.layers().current_path().cloned();
        for (path, node) in document.layers().deepenumerate() {
            let marker = if Some(&path) == current.as_ref() { '*' } else { ' ' };
            let indent = "  ".repeat(path.len());
            println!(" {marker}{indent}{}", describe(node));
        }
    }
    if failures == paths.len() {
        bail!("failed to load any provided document");
    }
    Ok(())
}

fn convert(
    input: &Path,
    output: &Path,
    options: SaveOptions,
    settings: &settings::Settings,
) -> AnyResult<()> {
    let mut document = Document::new(settings.document.clone());
    document.load(input, &LoadOptions::default())?;
    document.save(output, &options)?;
    log::info!("converted {input:?} to {output:?}");
    Ok(())
}

fn new(
    output: &Path,
    size: Option<(i32, i32)>,
    resolution: Option<u32>,
    settings: &settings::Settings,
) -> AnyResult<()> {
    let mut document = Document::new(settings.document.clone());
    if let Some((w, h)) = size {
        document.set_frame(Rect::new(0, 0, w, h), true)?;
    }
    if resolution.is_some() {
        document.set_resolution(resolution);
    }
    document.save(output, &SaveOptions::default())?;
    Ok(())
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let cli = Cli::parse();
    let settings = settings::Settings::load_or_default();
    match cli.command {
        Command::Info { files } => info(&files, &settings),
        Command::Convert {
            input,
            output,
            multifile,
            flat,
            quality,
        } => {
            let options = SaveOptions {
                multifile,
                alpha: settings.export.png_alpha && !flat,
                jpeg_quality: quality,
            };
            convert(&input, &output, options, &settings)
        }
        Command::New {
            output,
            size,
            resolution,
        } => new(&output, size, resolution, &settings),
        Command::Settings => {
            let path = settings.save()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from([
            "paintdoc", "convert", "a.ora", "b.jpg", "--flat", "--quality", "80",
        ])
        .unwrap();
        let Command::Convert {
            flat,
            quality,
            multifile,
            ..
        } = cli.command
        else {
            panic!("wrong subcommand");
        };
        assert!(flat && !multifile);
        assert_eq!(quality, Some(80));

        let cli = Cli::try_parse_from(["paintdoc", "new", "x.ora", "--size", "640x480"]).unwrap();
        assert!(matches!(cli.command, Command::New { size: Some((640, 480)), .. }));
    }
    #[test]
    fn rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["paintdoc", "info"]).is_err());
        assert!(Cli::try_parse_from(["paintdoc", "convert", "a", "b", "--quality", "0"]).is_err());
        assert!(Cli::try_parse_from(["paintdoc", "new", "x", "--size", "640"]).is_err());
        assert!(Cli::try_parse_from(["paintdoc", "frobnicate"]).is_err());
    }
}
