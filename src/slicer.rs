//! Sub-image extraction.
//!
//! The orchestrator hands the page image and the recognized boxes to an
//! [`ImageSlicer`] and gets back a map from box ordinal (as a decimal
//! string) to the identifier of the stored crop. The assembler later uses
//! that map to place figures inline.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::ImageFormat;
use tracing::{debug, warn};

use crate::error::ScanDocError;
use crate::model::LabeledBox;
use crate::store::Store;

/// Box labels worth cropping out as standalone images.
const PICTURE_LABELS: [&str; 3] = ["image", "figure", "table"];

#[async_trait]
pub trait ImageSlicer: Send + Sync {
    /// Crop the picture-bearing boxes out of `image` and persist each crop.
    /// Returns box-ordinal → extracted-image identifier for the crops that
    /// were actually produced.
    async fn slice_images(
        &self,
        page_id: &str,
        image: &[u8],
        boxes: &[LabeledBox],
    ) -> Result<HashMap<String, String>, ScanDocError>;
}

/// Decodes the page bitmap, crops each picture box, and stores the crops
/// as PNG through the [`Store`].
pub struct PngImageSlicer {
    store: Arc<dyn Store>,
}

impl PngImageSlicer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PngImageSlicer { store }
    }
}

#[async_trait]
impl ImageSlicer for PngImageSlicer {
    async fn slice_images(
        &self,
        page_id: &str,
        image: &[u8],
        boxes: &[LabeledBox],
    ) -> Result<HashMap<String, String>, ScanDocError> {
        let page = image::load_from_memory(image).map_err(|e| ScanDocError::Slice {
            id: page_id.to_string(),
            detail: e.to_string(),
        })?;
        let (page_w, page_h) = (page.width(), page.height());

        let mut map = HashMap::new();
        for (index, labeled) in boxes.iter().enumerate() {
            if !PICTURE_LABELS.contains(&labeled.label.to_lowercase().as_str()) {
                continue;
            }

            let [x1, y1, x2, y2] = labeled.rect;
            let x = (x1.max(0.0) as u32).min(page_w);
            let y = (y1.max(0.0) as u32).min(page_h);
            let w = ((x2.max(0.0) as u32).min(page_w)).saturating_sub(x);
            let h = ((y2.max(0.0) as u32).min(page_h)).saturating_sub(y);
            if w == 0 || h == 0 {
                warn!(page = page_id, index, "skipping degenerate box");
                continue;
            }

            let crop = page.crop_imm(x, y, w, h);
            let mut png = Cursor::new(Vec::new());
            crop.write_to(&mut png, ImageFormat::Png)
                .map_err(|e| ScanDocError::Slice {
                    id: page_id.to_string(),
                    detail: e.to_string(),
                })?;

            let image_id = format!("{page_id}-box{index}");
            self.store
                .save_extracted_image(&image_id, png.into_inner())
                .await?;
            debug!(page = page_id, index, image_id, "stored cropped figure");
            map.insert(index.to_string(), image_id);
        }
        Ok(map)
    }
}
