//! PDF rasterization with pdfium-render.

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::AcquisitionError;

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> Result<Pdfium, AcquisitionError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| AcquisitionError::PdfiumUnavailable {
            message: format!("Failed to load PDFium library: {:?}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Pixel size of a page of `points` PDF points rendered at `dpi`.
pub fn points_to_pixels(points: f32, dpi: u16) -> i32 {
    ((points as f64) * (dpi as f64) / 72.0).ceil().max(1.0) as i32
}

/// Render the pages of a PDF in document order, handing each to `on_page`
/// before the next one is rendered.
///
/// Fails before rendering anything if the page count exceeds `max_pages`.
/// Stops early once `on_page` returns `false`. Returns the number of pages
/// handed over.
pub fn render_pdf_pages(
    bytes: &[u8],
    dpi: u16,
    max_pages: usize,
    mut on_page: impl FnMut(DynamicImage) -> bool,
) -> Result<usize, AcquisitionError> {
    let pdfium = create_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| AcquisitionError::Render {
                page: 0,
                message: format!("Failed to load PDF: {}", e),
            })?;

    let pages = document.pages();
    let count = pages.len() as usize;
    if count == 0 {
        return Err(AcquisitionError::NoPages);
    }
    if count > max_pages {
        return Err(AcquisitionError::TooManyPages {
            count,
            max: max_pages,
        });
    }

    let mut rendered = 0;
    for (index, page) in pages.iter().enumerate() {
        let page_no = index + 1;
        let width = points_to_pixels(page.width().value, dpi);
        let height = points_to_pixels(page.height().value, dpi);

        debug!(page_no, width, height, dpi, "Rendering PDF page");

        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| AcquisitionError::Render {
                page: page_no,
                message: e.to_string(),
            })?;

        if !on_page(bitmap.as_image()) {
            debug!(page_no, "Page consumer gone, stopping render");
            break;
        }
        rendered += 1;
    }

    Ok(rendered)
}
