//! Tesseract-backed fallback recognizer

use super::{FallbackOcr, FallbackText};
use crate::error::{OcrError, Result};
use image::RgbImage;
use leptess::{LepTess, Variable};

/// Page segmentation mode 7: treat the image as a single text line
const PSM_SINGLE_LINE: &str = "7";

/// Classical recognizer with no symbol dictionary, via `leptess`
pub struct TesseractFallback {
    tess: LepTess,
    language: String,
}

impl std::fmt::Debug for TesseractFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesseractFallback")
            .field("tess", &"<LepTess>")
            .field("language", &self.language)
            .finish()
    }
}

impl TesseractFallback {
    /// Initialize Tesseract for `language` (e.g. "eng", "eng+deu")
    ///
    /// # Errors
    ///
    /// Returns [`OcrError::FallbackError`] if the language data is missing.
    pub fn new(language: &str) -> Result<Self> {
        let mut tess = LepTess::new(None, language).map_err(|e| {
            OcrError::FallbackError(format!(
                "failed to initialize Tesseract with language '{language}': {e}"
            ))
        })?;
        tess.set_variable(Variable::TesseditPagesegMode, PSM_SINGLE_LINE)
            .map_err(|e| OcrError::FallbackError(format!("failed to set PSM: {e}")))?;
        log::debug!("Tesseract fallback ready (language: {language})");
        Ok(Self {
            tess,
            language: language.to_string(),
        })
    }
}

impl FallbackOcr for TesseractFallback {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&mut self, crop: &RgbImage) -> Result<FallbackText> {
        let (width, height) = crop.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::FallbackError(format!(
                "crop must be non-empty (got {width}x{height})"
            )));
        }

        // leptess decodes encoded image data, not raw pixels
        let mut png_buf = std::io::Cursor::new(Vec::new());
        crop.write_to(&mut png_buf, image::ImageFormat::Png)
            .map_err(|e| OcrError::FallbackError(format!("failed to encode crop: {e}")))?;
        self.tess
            .set_image_from_mem(png_buf.get_ref())
            .map_err(|e| OcrError::FallbackError(format!("failed to set image: {e}")))?;

        let text = self
            .tess
            .get_utf8_text()
            .map_err(|e| OcrError::FallbackError(format!("invalid UTF-8 from Tesseract: {e}")))?;
        #[allow(clippy::cast_precision_loss)]
        let confidence = self.tess.mean_text_conf().clamp(0, 100) as f32;

        Ok(FallbackText { text, confidence })
    }
}
