//! Document -> pages -> crops -> model calls -> reconciled result.

use std::io::Cursor;

use base64::Engine;
use futures::StreamExt;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, warn};

use crate::bill::{
    CandidateList, CropTier, Fixed2, PageResult, PageType, ParsedReply, PrintedTotal, ReconciledDocument,
    TokenUsage, aggregate, parse_model_reply, reconcile, verify_printed_totals,
};
use crate::error::{ModelError, ServiceError, ServiceResult, format_error_chain};
use crate::ingestion::crops::{CropSpec, crops_for};
use crate::ingestion::preprocess::preprocess_page;
use crate::model::{ExtractionModel, VisionPrompt};

use super::ExtractionService;
use super::prompts::{SYSTEM_PROMPT, crop_prompt, retry_prompt};

/// Result of one extraction request
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub document: ReconciledDocument,
    /// Summed over every model reply received, including unparseable ones
    pub token_usage: TokenUsage,
}

/// A crop encoded for the model
struct EncodedCrop {
    spec: CropSpec,
    image_base64: String,
}

/// What one crop contributed. `reply` is `None` when the call or parse failed.
struct CropOutcome {
    spec: CropSpec,
    reply: Option<ParsedReply>,
    usage: TokenUsage,
}

struct PageExtraction {
    result: PageResult,
    printed_total: Option<Fixed2>,
    usage: TokenUsage,
}

fn encode_png(image: &DynamicImage) -> Result<String, ModelError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(ModelError::Encoding)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buffer.into_inner()))
}

/// Page type from the highest-priority crop that reported something other than `Other`.
fn resolve_page_type(outcomes: &[CropOutcome]) -> PageType {
    outcomes
        .iter()
        .filter_map(|o| o.reply.as_ref()?.page_type)
        .find(|page_type| *page_type != PageType::Other)
        .unwrap_or_default()
}

/// Build the page result from crop outcomes already sorted by priority.
fn assemble_page(page_no: usize, outcomes: Vec<CropOutcome>) -> (PageResult, Option<Fixed2>) {
    let page_type = resolve_page_type(&outcomes);
    let printed_total = outcomes
        .iter()
        .find_map(|o| o.reply.as_ref()?.printed_total.clone());

    let lists = outcomes
        .into_iter()
        .map(|o| match o.reply {
            Some(reply) => CandidateList::new(o.spec.tier, o.spec.ordinal, reply.items),
            None => CandidateList::empty(o.spec.tier, o.spec.ordinal),
        })
        .collect();

    (reconcile(page_no.to_string(), page_type, lists), printed_total)
}

impl<M: ExtractionModel> ExtractionService<M> {
    /// Run the whole extraction for one document reference.
    ///
    /// Acquisition failures abort the request. Model failures only ever empty
    /// the contribution of the crop they happened on.
    pub async fn extract_document(&self, document: &str) -> ServiceResult<ExtractionOutcome> {
        let source = self.ingestion.fetch(document).await?;
        info!(
            origin = %source.origin,
            fingerprint = %source.fingerprint,
            "Starting extraction"
        );

        let mut pages = self.ingestion.page_images(&source);

        let mut token_usage = TokenUsage::default();
        let mut results = Vec::new();
        let mut printed_totals = Vec::new();

        // Pages run one at a time; crops within a page run concurrently
        while let Some(page) = pages.next_page().await? {
            let page_no = results.len() + 1;
            let extraction = self.extract_page(page_no, page).await?;

            token_usage += extraction.usage;
            if let Some(value) = extraction.printed_total {
                printed_totals.push(PrintedTotal {
                    page_no: extraction.result.page_no.clone(),
                    value,
                });
            }
            results.push(extraction.result);
        }

        let document = aggregate(results);

        let diagnostics = verify_printed_totals(document.reconciled_amount(), &printed_totals);
        match diagnostics.closest() {
            Some(check) if diagnostics.has_match() => {
                info!(page_no = %check.page_no, total = %check.printed_total, "Reconciled amount matches printed total")
            }
            Some(check) => warn!(
                page_no = %check.page_no,
                printed_total = %check.printed_total,
                reconciled_amount = %diagnostics.reconciled_amount,
                delta = %check.delta,
                "Reconciled amount differs from printed total"
            ),
            None => debug!("No printed total reported"),
        }

        info!(
            pages = document.pages().len(),
            total_item_count = document.total_item_count(),
            total_tokens = token_usage.total_tokens,
            "Extraction complete"
        );

        Ok(ExtractionOutcome {
            document,
            token_usage,
        })
    }

    async fn extract_page(&self, page_no: usize, page: DynamicImage) -> ServiceResult<PageExtraction> {
        let config = self.config.clone();
        let crops = tokio::task::spawn_blocking(move || {
            let page = preprocess_page(page, &config.preprocessing);
            crops_for(page_no, &page, &config.crops)
                .into_iter()
                .filter_map(|crop| match encode_png(&crop.image) {
                    Ok(image_base64) => Some(EncodedCrop {
                        spec: crop.spec,
                        image_base64,
                    }),
                    Err(e) => {
                        warn!(crop_id = %crop.spec.id, error = %format_error_chain(&e), "Skipping crop");
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Crop preparation task failed: {}", e),
        })?;

        debug!(page_no, crops = crops.len(), "Crops prepared");

        let calls: Vec<_> = crops
            .iter()
            .map(|crop| self.extract_crop(crop, crop_prompt(page_no, &crop.spec)))
            .collect();
        let mut outcomes: Vec<CropOutcome> = futures::stream::iter(calls)
            .buffer_unordered(self.config.crops.concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|o| (o.spec.tier, o.spec.ordinal));

        let mut usage = TokenUsage::default();
        for outcome in &outcomes {
            usage += outcome.usage;
        }

        if self.config.crops.retry_empty_full_page {
            usage += self.retry_empty_full_page(page_no, &crops, &mut outcomes).await;
        }

        let (result, printed_total) = assemble_page(page_no, outcomes);
        info!(
            page_no,
            page_type = %result.page_type,
            items = result.items.len(),
            "Page reconciled"
        );

        Ok(PageExtraction {
            result,
            printed_total,
            usage,
        })
    }

    /// Ask once more for the full page when it parsed cleanly but held no items.
    ///
    /// The retry only replaces the original reply if it found something.
    async fn retry_empty_full_page(
        &self,
        page_no: usize,
        crops: &[EncodedCrop],
        outcomes: &mut [CropOutcome],
    ) -> TokenUsage {
        let Some(full) = outcomes
            .iter_mut()
            .find(|o| o.spec.tier == CropTier::FullPage)
        else {
            return TokenUsage::default();
        };
        if !full.reply.as_ref().is_some_and(|r| r.items.is_empty()) {
            return TokenUsage::default();
        }
        let Some(crop) = crops.iter().find(|c| c.spec == full.spec) else {
            return TokenUsage::default();
        };

        info!(page_no, crop_id = %crop.spec.id, "Full page returned no items, retrying");
        let retry = self.extract_crop(crop, retry_prompt(page_no)).await;

        if retry.reply.as_ref().is_some_and(|r| !r.items.is_empty()) {
            full.reply = retry.reply;
        }
        retry.usage
    }

    async fn extract_crop(&self, crop: &EncodedCrop, user: String) -> CropOutcome {
        let prompt = VisionPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
            image_base64: crop.image_base64.clone(),
        };
        let timeout = self.config.model.request_timeout();
        let spec = crop.spec.clone();

        let reply = match tokio::time::timeout(timeout, self.model.extract(prompt)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(crop_id = %spec.id, error = %format_error_chain(&e), "Crop extraction failed");
                return CropOutcome {
                    spec,
                    reply: None,
                    usage: TokenUsage::default(),
                };
            }
            Err(_) => {
                warn!(
                    crop_id = %spec.id,
                    secs = self.config.model.request_timeout_secs,
                    "Crop extraction timed out"
                );
                return CropOutcome {
                    spec,
                    reply: None,
                    usage: TokenUsage::default(),
                };
            }
        };

        let parsed = match parse_model_reply(&reply.content) {
            Ok(parsed) => {
                debug!(
                    crop_id = %spec.id,
                    tier = spec.tier.as_str(),
                    items = parsed.items.len(),
                    "Crop extracted"
                );
                Some(parsed)
            }
            Err(e) => {
                warn!(crop_id = %spec.id, error = %format_error_chain(&e), "Unparseable model reply");
                None
            }
        };

        CropOutcome {
            spec,
            reply: parsed,
            usage: reply.usage,
        }
    }
}
