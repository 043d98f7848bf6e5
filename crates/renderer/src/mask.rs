//! Host-side mirror of the dissolve fragment shader.
//!
//! Every function here matches a GLSL function in `compile.rs` line for line so
//! the mask can be inspected and tested without a GPU. The only state is the
//! cell identity; nothing carries over between pixels or frames.

use image::GrayImage;

/// Golden ratio used to decorrelate neighbouring cell coordinates.
pub const PHI: f32 = 1.618_034;
/// Seed that picks which glyph variant a cell shows.
pub const VARIANT_SEED: f32 = 23.0;
/// Seed that picks when a cell reveals.
pub const THRESHOLD_SEED: f32 = 42.0;

/// Integer grid coordinate of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    pub column: i32,
    pub row: i32,
}

impl CellId {
    fn as_vec(self) -> [f32; 2] {
        [self.column as f32, self.row as f32]
    }
}

/// Cell extent in normalised surface units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f32,
    pub height: f32,
}

impl CellSize {
    /// Derives the cell size from the atlas and source dimensions.
    ///
    /// The atlas carries two glyphs side by side, so one cell is half the atlas
    /// wide.
    pub fn derive(source: (u32, u32), atlas: (u32, u32), character_scaling: f32) -> Self {
        let (source_w, source_h) = source;
        let (atlas_w, atlas_h) = atlas;
        Self {
            width: (atlas_w as f32 * character_scaling * 0.5) / source_w as f32,
            height: (atlas_h as f32 * character_scaling) / source_h as f32,
        }
    }

    pub fn as_array(self) -> [f32; 2] {
        [self.width, self.height]
    }

    /// Number of cells (columns, rows) needed to cover the unit square.
    pub fn grid_dimensions(self) -> (u32, u32) {
        let columns = (1.0 / self.width - 1.0e-4).ceil().max(1.0) as u32;
        let rows = (1.0 / self.height - 1.0e-4).ceil().max(1.0) as u32;
        (columns, rows)
    }

    /// Splits a normalised coordinate into its cell and the position inside it.
    pub fn locate(self, uv: [f32; 2]) -> (CellId, [f32; 2]) {
        let grid = [uv[0] / self.width, uv[1] / self.height];
        let cell = [grid[0].floor(), grid[1].floor()];
        (
            CellId {
                column: cell[0] as i32,
                row: cell[1] as i32,
            },
            [grid[0] - cell[0], grid[1] - cell[1]],
        )
    }
}

fn fract(value: f32) -> f32 {
    value - value.floor()
}

/// Deterministic value in `[0, 1]` for a cell and seed.
pub fn random(cell: CellId, seed: f32) -> f32 {
    let [x, y] = cell.as_vec();
    let dx = x * PHI - x;
    let dy = y * PHI - y;
    let distance = (dx * dx + dy * dy).sqrt();
    fract((distance * seed).tan() * distance).clamp(0.0, 1.0)
}

/// Which half of the atlas the cell samples: 0 = left, 1 = right.
pub fn variant_bit(cell: CellId) -> u32 {
    (random(cell, VARIANT_SEED) + 0.5).floor().clamp(0.0, 1.0) as u32
}

/// Progress-space threshold for the cell's reveal.
pub fn reveal_threshold(cell: CellId) -> f32 {
    random(cell, THRESHOLD_SEED)
}

/// How visible a cell with `threshold` is at `progress`.
///
/// The fade band is `smoothness` wide in the shifted space
/// `threshold - progress * (1 + smoothness)`, which guarantees every cell is
/// hidden at progress 0 and fully shown at progress 1.
pub fn visibility(threshold: f32, progress: f32, smoothness: f32) -> f32 {
    let lead = threshold - progress * (1.0 + smoothness);
    if smoothness <= 0.0 {
        return if lead <= 0.0 { 1.0 } else { 0.0 };
    }
    let t = (lead / -smoothness).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Progress interval over which a cell goes from hidden to fully visible.
pub fn transition_window(threshold: f32, smoothness: f32) -> (f32, f32) {
    let scale = 1.0 + smoothness.max(0.0);
    (threshold / scale, (threshold + smoothness.max(0.0)) / scale)
}

/// Nearest-neighbour sampler over the single-channel atlas as it is uploaded
/// (rows flipped so `v = 0` is the bottom edge).
#[derive(Debug, Clone)]
pub struct GlyphAtlas {
    width: u32,
    height: u32,
    texels: Vec<u8>,
}

impl GlyphAtlas {
    pub fn from_luma(image: &GrayImage) -> Self {
        let mut flipped = image.clone();
        image::imageops::flip_vertical_in_place(&mut flipped);
        Self {
            width: image.width(),
            height: image.height(),
            texels: flipped.into_raw(),
        }
    }

    pub fn sample(&self, uv: [f32; 2]) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let x = ((uv[0].clamp(0.0, 1.0) * self.width as f32) as u32).min(self.width - 1);
        let y = ((uv[1].clamp(0.0, 1.0) * self.height as f32) as u32).min(self.height - 1);
        self.texels[(y * self.width + x) as usize] as f32 / 255.0
    }
}

/// Per-frame inputs shared by every pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskParams {
    pub cell_size: CellSize,
    pub progress: f32,
    pub smoothness: f32,
}

/// Result of evaluating the mask for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskSample {
    pub cell: CellId,
    pub variant: u32,
    pub glyph: f32,
    pub visibility: f32,
}

impl MaskSample {
    pub fn alpha(&self) -> f32 {
        self.glyph * self.visibility
    }
}

/// Evaluates the mask at normalised coordinate `uv`.
pub fn evaluate(uv: [f32; 2], params: &MaskParams, atlas: &GlyphAtlas) -> MaskSample {
    let (cell, within) = params.cell_size.locate(uv);
    let variant = variant_bit(cell);
    let glyph_uv = [within[0] * 0.5 + 0.5 * variant as f32, within[1]];
    let glyph = atlas.sample(glyph_uv);
    let visibility = visibility(reveal_threshold(cell), params.progress, params.smoothness);
    MaskSample {
        cell,
        variant,
        glyph,
        visibility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn sampled_cells(count: usize) -> Vec<CellId> {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        (0..count)
            .map(|_| CellId {
                column: rng.gen_range(-500..500),
                row: rng.gen_range(-500..500),
            })
            .collect()
    }

    #[test]
    fn random_field_stays_in_unit_range() {
        for cell in sampled_cells(4096) {
            for seed in [VARIANT_SEED, THRESHOLD_SEED] {
                let value = random(cell, seed);
                assert!((0.0..=1.0).contains(&value), "{cell:?} -> {value}");
            }
        }
    }

    #[test]
    fn cell_choices_are_stable_across_frames() {
        for cell in sampled_cells(512) {
            let bit = variant_bit(cell);
            let threshold = reveal_threshold(cell);
            for _ in 0..8 {
                assert_eq!(variant_bit(cell), bit);
                assert_eq!(reveal_threshold(cell).to_bits(), threshold.to_bits());
            }
        }
    }

    #[test]
    fn both_variants_are_used() {
        let bits: HashSet<u32> = (0..20)
            .flat_map(|column| (0..20).map(move |row| CellId { column, row }))
            .map(variant_bit)
            .collect();
        assert_eq!(bits, HashSet::from([0, 1]));
    }

    #[test]
    fn every_cell_is_hidden_at_start_and_shown_at_end() {
        for smoothness in [0.05, 0.2, 1.0] {
            for cell in sampled_cells(1024) {
                let threshold = reveal_threshold(cell);
                assert_eq!(visibility(threshold, 0.0, smoothness), 0.0);
                assert_eq!(visibility(threshold, 1.0, smoothness), 1.0);
            }
        }
    }

    #[test]
    fn zero_smoothness_pops_cells_in() {
        assert_eq!(visibility(0.5, 0.49, 0.0), 0.0);
        assert_eq!(visibility(0.5, 0.5, 0.0), 1.0);
        assert_eq!(visibility(0.999, 1.0, 0.0), 1.0);
    }

    #[test]
    fn visibility_rises_monotonically_with_progress() {
        let threshold = 0.4;
        let mut last = 0.0;
        for step in 0..=100 {
            let value = visibility(threshold, step as f32 / 100.0, 0.2);
            assert!(value >= last);
            last = value;
        }
    }

    #[test]
    fn larger_smoothness_widens_the_transition() {
        let threshold = 0.6;
        let mut last_width = 0.0;
        for smoothness in [0.0, 0.1, 0.2, 0.5, 1.0] {
            let (start, end) = transition_window(threshold, smoothness);
            let width = end - start;
            assert!(width >= last_width);
            if smoothness > 0.0 {
                assert!(width > last_width);
                let before = visibility(threshold, start - 1.0e-3, smoothness);
                let after = visibility(threshold, end + 1.0e-3, smoothness);
                assert_eq!(before, 0.0);
                assert_eq!(after, 1.0);
            }
            last_width = width;
        }
    }

    #[test]
    fn hundred_pixel_source_with_ten_pixel_glyphs_forms_ten_by_ten_grid() {
        let cell_size = CellSize::derive((100, 100), (20, 10), 1.0);
        assert!((cell_size.width - 0.1).abs() < 1e-6);
        assert!((cell_size.height - 0.1).abs() < 1e-6);
        assert_eq!(cell_size.grid_dimensions(), (10, 10));

        let mut cells = HashSet::new();
        for y in 0..100 {
            for x in 0..100 {
                let uv = [(x as f32 + 0.5) / 100.0, (y as f32 + 0.5) / 100.0];
                cells.insert(cell_size.locate(uv).0);
            }
        }
        assert_eq!(cells.len(), 100);
        assert!(cells
            .iter()
            .all(|cell| (0..10).contains(&cell.column) && (0..10).contains(&cell.row)));
    }

    #[test]
    fn character_scaling_grows_cells() {
        let base = CellSize::derive((200, 100), (20, 10), 1.0);
        let doubled = CellSize::derive((200, 100), (20, 10), 2.0);
        assert!((doubled.width - base.width * 2.0).abs() < 1e-6);
        assert_eq!(doubled.grid_dimensions(), (10, 5));
    }

    #[test]
    fn evaluation_picks_the_half_matching_the_variant() {
        // Left glyph fully lit, right glyph dark.
        let atlas_image = GrayImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let atlas = GlyphAtlas::from_luma(&atlas_image);
        let params = MaskParams {
            cell_size: CellSize::derive((100, 100), (20, 10), 1.0),
            progress: 1.0,
            smoothness: 0.2,
        };

        for y in 0..10 {
            for x in 0..10 {
                let uv = [(x as f32 + 0.5) / 10.0, (y as f32 + 0.5) / 10.0];
                let sample = evaluate(uv, &params, &atlas);
                let expected = if sample.variant == 0 { 1.0 } else { 0.0 };
                assert_eq!(sample.glyph, expected);
                assert_eq!(sample.visibility, 1.0);
            }
        }
    }

    #[test]
    fn solid_atlas_reveals_the_full_image_at_the_end() {
        let atlas = GlyphAtlas::from_luma(&GrayImage::from_pixel(20, 10, Luma([255])));
        let cell_size = CellSize::derive((100, 100), (20, 10), 1.0);
        let start = MaskParams {
            cell_size,
            progress: 0.0,
            smoothness: 0.2,
        };
        let end = MaskParams {
            progress: 1.0,
            ..start
        };
        for y in 0..100 {
            for x in 0..100 {
                let uv = [(x as f32 + 0.5) / 100.0, (y as f32 + 0.5) / 100.0];
                assert_eq!(evaluate(uv, &start, &atlas).alpha(), 0.0);
                assert_eq!(evaluate(uv, &end, &atlas).alpha(), 1.0);
            }
        }
    }

    #[test]
    fn atlas_sampling_uses_gpu_row_order() {
        // Top row bright in raster order ends up at v close to 1 once flipped.
        let atlas_image =
            GrayImage::from_fn(2, 2, |_, y| if y == 0 { Luma([255]) } else { Luma([0]) });
        let atlas = GlyphAtlas::from_luma(&atlas_image);
        assert_eq!(atlas.sample([0.25, 0.9]), 1.0);
        assert_eq!(atlas.sample([0.25, 0.1]), 0.0);
    }
}
