//! Crop planning for page images.
//!
//! Every page is sent to the model several times: once whole, once per
//! column of each configured column split, and once per sliding window.
//! Plans are pure geometry so they can be tested without pixels.

use image::DynamicImage;

use crate::bill::CropTier;
use crate::config::CropConfig;

/// Pixel rectangle within a page image, `x1`/`y1` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }
}

/// Where a crop sits on its page and how it ranks during reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropSpec {
    /// `p{page}_full`, `p{page}_col{n}_{i}` or `p{page}_slide_{i}`
    pub id: String,
    pub tier: CropTier,
    /// Generation order within the page
    pub ordinal: usize,
    pub bbox: BoundingBox,
}

/// A crop ready to send to the model
#[derive(Debug, Clone)]
pub struct Crop {
    pub spec: CropSpec,
    pub image: DynamicImage,
}

/// Plan every crop for a page of `width` x `height` pixels.
///
/// The full page always comes first. Column and window crops follow in
/// generation order and are capped at `max_crops_per_page`.
pub fn plan_crops(page_no: usize, width: u32, height: u32, config: &CropConfig) -> Vec<CropSpec> {
    let mut boxes: Vec<(String, CropTier, BoundingBox)> = vec![(
        format!("p{}_full", page_no),
        CropTier::FullPage,
        BoundingBox::new(0, 0, width, height),
    )];

    for &columns in &config.column_splits {
        for (i, bbox) in column_boxes(width, height, columns).into_iter().enumerate() {
            boxes.push((
                format!("p{}_col{}_{}", page_no, columns, i + 1),
                CropTier::Column,
                bbox,
            ));
        }
    }

    let windows = window_boxes(
        width,
        height,
        config.window_width,
        config.window_height,
        config.window_overlap,
    );
    for (i, bbox) in windows.into_iter().enumerate() {
        boxes.push((
            format!("p{}_slide_{}", page_no, i + 1),
            CropTier::Window,
            bbox,
        ));
    }

    boxes
        .into_iter()
        .take(config.max_crops_per_page.saturating_add(1))
        .enumerate()
        .map(|(ordinal, (id, tier, bbox))| CropSpec {
            id,
            tier,
            ordinal,
            bbox,
        })
        .collect()
}

/// Split the page into `columns` vertical strips; the last strip absorbs the remainder.
pub fn column_boxes(width: u32, height: u32, columns: u32) -> Vec<BoundingBox> {
    if columns < 2 || width < columns || height == 0 {
        return Vec::new();
    }

    let step = width / columns;
    (0..columns)
        .map(|i| {
            let x0 = i * step;
            let x1 = if i + 1 == columns { width } else { x0 + step };
            BoundingBox::new(x0, 0, x1, height)
        })
        .collect()
}

/// Tile the page with overlapping windows scanned row by row.
///
/// The nominal window shrinks uniformly when the page is smaller than it.
/// Windows at the right and bottom edges are clipped to the page.
pub fn window_boxes(
    width: u32,
    height: u32,
    window_width: u32,
    window_height: u32,
    overlap: f64,
) -> Vec<BoundingBox> {
    if width == 0 || height == 0 || window_width == 0 || window_height == 0 {
        return Vec::new();
    }

    let scale = 1.0_f64
        .min(width as f64 / window_width as f64)
        .min(height as f64 / window_height as f64);
    let win_w = ((window_width as f64 * scale) as u32).max(1);
    let win_h = ((window_height as f64 * scale) as u32).max(1);

    let keep = 1.0 - overlap.clamp(0.0, 0.9);
    let step_x = ((win_w as f64 * keep) as u32).max(1);
    let step_y = ((win_h as f64 * keep) as u32).max(1);

    let mut boxes = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            boxes.push(BoundingBox::new(
                x,
                y,
                (x + win_w).min(width),
                (y + win_h).min(height),
            ));
            x += step_x;
        }
        y += step_y;
    }
    boxes
}

/// Cut the planned crops out of a preprocessed page image.
pub fn crops_for(page_no: usize, page: &DynamicImage, config: &CropConfig) -> Vec<Crop> {
    plan_crops(page_no, page.width(), page.height(), config)
        .into_iter()
        .map(|spec| {
            let image = if spec.tier == CropTier::FullPage {
                page.clone()
            } else {
                let b = spec.bbox;
                page.crop_imm(b.x0, b.y0, b.width(), b.height())
            };
            Crop { spec, image }
        })
        .collect()
}
