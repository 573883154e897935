use std::path::Path;

use anyhow::{Context, Result};

use yomibot::{load_font, Compositor, CompositorStyle, Config, TranslationRegion};

pub fn cmd_overlay(
    image_path: &Path,
    regions_path: &Path,
    output: &Path,
    font: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path).context("loading config")?;

    let json = std::fs::read_to_string(regions_path)
        .with_context(|| format!("reading {}", regions_path.display()))?;
    let regions: Vec<TranslationRegion> =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", regions_path.display()))?;

    let face = load_font(font.unwrap_or(config.render.font_path.as_path()))?;
    let image = image::open(image_path)
        .with_context(|| format!("opening {}", image_path.display()))?
        .to_rgba8();

    eprintln!("🖼  Overlaying {} regions onto {}", regions.len(), image_path.display());

    let compositor = Compositor::new(CompositorStyle::from(&config.render));
    let (composited, report) = compositor.render(image, &face, &regions);

    composited
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{}: {} bubbles, {} text blocks, {} unfitted, {} off-image",
        output.display(),
        report.bubbles,
        report.text_blocks,
        report.unfitted,
        report.offscreen
    );
    Ok(())
}
