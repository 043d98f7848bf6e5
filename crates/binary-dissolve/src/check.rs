use anyhow::{bail, Result};
use renderer::mask::{reveal_threshold, variant_bit, CellId};
use renderer::{load_assets, CellSize, DissolveConfig};

use crate::cli::EffectArgs;
use crate::run::{dissolve_config, merged_config};

/// Largest grid the report walks cell by cell.
const MAX_REPORT_CELLS: u64 = 16_000_000;

/// Summary of what a run would draw, computed without a GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct GridReport {
    pub source: (u32, u32),
    pub atlas: (u32, u32),
    pub cell_size: CellSize,
    pub columns: u32,
    pub rows: u32,
    /// Cells showing the right-hand glyph.
    pub right_variant_cells: u32,
    /// Earliest and latest reveal thresholds across the grid.
    pub threshold_range: (f32, f32),
}

impl GridReport {
    pub fn build(source: (u32, u32), atlas: (u32, u32), character_scaling: f32) -> Result<Self> {
        let cell_size = CellSize::derive(source, atlas, character_scaling);
        let (columns, rows) = cell_size.grid_dimensions();
        let cells = u64::from(columns) * u64::from(rows);
        if cells > MAX_REPORT_CELLS {
            bail!(
                "grid of {columns}x{rows} cells is too large to report \
                 (limit {MAX_REPORT_CELLS}); raise character_scaling"
            );
        }

        let mut right_variant_cells = 0;
        let mut threshold_range = (f32::INFINITY, f32::NEG_INFINITY);
        for row in 0..rows as i32 {
            for column in 0..columns as i32 {
                let cell = CellId { column, row };
                right_variant_cells += variant_bit(cell);
                let threshold = reveal_threshold(cell);
                threshold_range.0 = threshold_range.0.min(threshold);
                threshold_range.1 = threshold_range.1.max(threshold);
            }
        }

        Ok(Self {
            source,
            atlas,
            cell_size,
            columns,
            rows,
            right_variant_cells,
            threshold_range,
        })
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.rows)
    }
}

pub fn check(args: EffectArgs) -> Result<()> {
    let config = merged_config(&args)?;
    let dissolve = dissolve_config(&config)?;
    let assets = load_assets(&dissolve.image_src, &dissolve.characters_src)?;
    let report = GridReport::build(
        assets.source_dimensions(),
        assets.glyph_dimensions(),
        dissolve.character_scaling,
    )?;
    print_report(&dissolve, &report);
    Ok(())
}

fn print_report(dissolve: &DissolveConfig, report: &GridReport) {
    let (source_w, source_h) = report.source;
    let (atlas_w, atlas_h) = report.atlas;
    println!("image: {} ({source_w}x{source_h})", dissolve.image_src.describe());
    println!(
        "characters: {} ({atlas_w}x{atlas_h})",
        dissolve.characters_src.describe()
    );
    println!(
        "duration: {}",
        humantime::format_duration(dissolve.duration)
    );
    println!("delay: {}", humantime::format_duration(dissolve.delay));
    println!("smoothness: {}", dissolve.smoothness);
    println!("character scaling: {}", dissolve.character_scaling);
    println!(
        "cell: {:.4} x {:.4} (normalised)",
        report.cell_size.width, report.cell_size.height
    );
    println!("grid: {}x{} cells", report.columns, report.rows);

    let total = report.cell_count().max(1) as f64;
    let right = f64::from(report.right_variant_cells) / total * 100.0;
    println!("variants: {:.1}% left / {:.1}% right", 100.0 - right, right);
    println!(
        "thresholds: {:.3}..{:.3}",
        report.threshold_range.0, report.threshold_range.1
    );
    if atlas_w % 2 != 0 {
        println!("warning: atlas width {atlas_w} is odd; glyph halves will not align");
    }
}
