//! mediaferry: CLI for checking images against platform aspect ratios.
//!
//! Lists the built-in platform profiles, evaluates an image file against
//! one of them, writes a center-cropped copy when it does not fit, and
//! validates generation-backend responses. Useful for:
//!
//! - Checking what the composer will do with a library image
//! - Reproducing crop rectangles for a given size and platform
//! - Inspecting a captured backend response
//!
//! # Usage
//!
//! ```text
//! cargo run --bin mediaferry -- check photo.jpg --platform instagram
//! cargo run --bin mediaferry -- reframe photo.jpg --platform pinterest -o pin.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mediaferry_core::{
    GenerationKind, Platform, PlatformProfile, compute_crop, evaluate, measure, parse_generation,
    try_reframe,
};
use tracing_subscriber::EnvFilter;

/// Aspect-ratio diagnostics for mediaferry.
#[derive(Parser)]
#[command(name = "mediaferry", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the built-in platform profiles.
    Profiles {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Evaluate an image against a platform's ratio.
    Check {
        /// Path to the input image (PNG, JPEG, BMP, WebP).
        image_path: PathBuf,

        #[command(flatten)]
        target: Target,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Center-crop an image to a platform's ratio and write it as PNG.
    Reframe {
        /// Path to the input image (PNG, JPEG, BMP, WebP).
        image_path: PathBuf,

        #[command(flatten)]
        target: Target,

        /// Output path. Written even when no crop is needed.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate a generation-backend response body.
    Generation {
        /// Endpoint that produced the response.
        #[arg(long, value_enum)]
        kind: Kind,

        /// File holding the JSON body; reads stdin when omitted.
        path: Option<PathBuf>,
    },
}

/// Which ratio to check against.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Built-in platform id (see `mediaferry profiles`).
    #[arg(long, value_parser = parse_platform)]
    platform: Option<Platform>,

    /// Custom width / height ratio, e.g. 1.5.
    #[arg(long)]
    ratio: Option<f64>,
}

impl Target {
    fn profile(&self) -> PlatformProfile {
        match (self.platform, self.ratio) {
            (Some(platform), _) => platform.profile(),
            (None, Some(ratio)) => PlatformProfile::new("custom", ratio),
            (None, None) => Platform::InstagramFeed.profile(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    SocialPost,
    BlogPost,
    Image,
}

impl From<Kind> for GenerationKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::SocialPost => Self::SocialPost,
            Kind::BlogPost => Self::BlogPost,
            Kind::Image => Self::Image,
        }
    }
}

fn parse_platform(id: &str) -> Result<Platform, String> {
    Platform::from_id(id).ok_or_else(|| {
        let known: Vec<&str> = Platform::ALL.iter().map(|p| p.id()).collect();
        format!("unknown platform `{id}` (expected one of: {})", known.join(", "))
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Profiles { json } => {
            print_profiles(json);
            Ok(())
        }
        Command::Check {
            image_path,
            target,
            json,
        } => check(&image_path, &target.profile(), json),
        Command::Reframe {
            image_path,
            target,
            output,
        } => reframe_file(&image_path, &target.profile(), &output),
        Command::Generation { kind, path } => validate_generation(kind.into(), path.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            tracing::error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn print_profiles(json: bool) {
    if json {
        let rows: Vec<_> = Platform::ALL
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id(),
                    "label": p.label(),
                    "ratio": p.ratio_label(),
                    "target_ratio": p.target_ratio(),
                })
            })
            .collect();
        println!("{}", serde_json::Value::Array(rows));
        return;
    }
    println!("{:<16} {:<16} {:>7} {:>8}", "ID", "PLATFORM", "RATIO", "W/H");
    for p in Platform::ALL {
        println!(
            "{:<16} {:<16} {:>7} {:>8.4}",
            p.id(),
            p.label(),
            p.ratio_label(),
            p.target_ratio()
        );
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn check(path: &Path, profile: &PlatformProfile, json: bool) -> Result<(), String> {
    let bytes = read_image(path)?;
    let dimensions =
        measure(&bytes).ok_or_else(|| format!("{} is not a decodable image", path.display()))?;
    let verdict = evaluate(dimensions.width, dimensions.height, profile);
    let crop = (!verdict.is_match)
        .then(|| compute_crop(dimensions.width, dimensions.height, profile.target_ratio));

    if json {
        let report = serde_json::json!({
            "image": path.display().to_string(),
            "dimensions": dimensions,
            "profile": profile,
            "verdict": verdict,
            "crop": crop,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => return Err(format!("Error serializing report: {e}")),
        }
        return Ok(());
    }

    println!("Image:    {} ({dimensions})", path.display());
    println!(
        "Target:   {} ({:.4}, tolerance {:.0}%)",
        profile.id,
        profile.target_ratio,
        profile.tolerance_fraction * 100.0
    );
    println!("Actual:   {:.4}", verdict.actual_ratio);
    if verdict.is_match {
        println!("Verdict:  match");
    } else {
        println!("Verdict:  mismatch, crop {}", verdict.crop_axis);
    }
    if let Some(advice) = verdict.suggestion(&profile.id) {
        println!("Advice:   {advice}");
    }
    if let Some(rect) = crop {
        println!(
            "Crop:     x={} y={} {}x{}",
            rect.x, rect.y, rect.width, rect.height
        );
    }
    Ok(())
}

fn reframe_file(path: &Path, profile: &PlatformProfile, output: &Path) -> Result<(), String> {
    let bytes = read_image(path)?;
    let reframed = try_reframe(&bytes, profile)
        .map_err(|e| format!("Error re-framing {}: {e}", path.display()))?;
    std::fs::write(output, &reframed.bytes)
        .map_err(|e| format!("Error writing {}: {e}", output.display()))?;
    match reframed.crop {
        Some(rect) => tracing::info!(
            axis = %reframed.verdict.crop_axis,
            "cropped to {}x{} at ({}, {}), wrote {}",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            output.display()
        ),
        None => tracing::info!("no crop needed, copied to {}", output.display()),
    }
    Ok(())
}

fn validate_generation(kind: GenerationKind, path: Option<&Path>) -> Result<(), String> {
    let body = match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .map_err(|e| format!("Error reading stdin: {e}"))?;
            body
        }
    };
    let output = parse_generation(kind, &body).map_err(|e| e.to_string())?;
    println!("kind:    {}", output.kind());
    if let Some(caption) = output.caption() {
        println!("caption: {caption}");
    }
    match output.image_ref() {
        Some(image) if mediaferry_core::types::is_inline_ref(image) => {
            println!("image:   inline ({} bytes)", image.len());
        }
        Some(image) => println!("image:   {image}"),
        None => println!("image:   none"),
    }
    Ok(())
}
