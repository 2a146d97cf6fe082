//! Document acquisition: fetch a bill by URL or path and turn it into page images.

pub mod crops;
pub mod hash;
pub mod pdf;
pub mod preprocess;

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use mime::Mime;
use reqwest::{Client, Url, header::CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AcquisitionConfig;
use crate::error::{AcquisitionError, ServiceError, ServiceResult};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Rendered pages allowed to wait for the pipeline
const PAGE_BUFFER: usize = 1;

/// Detected document container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image(ImageFormat),
}

/// A fetched document, not yet rendered
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub origin: String,
    pub bytes: Bytes,
    pub format: DocumentFormat,
    /// SHA-256 of `bytes`
    pub fingerprint: String,
}

/// Where a document reference points
#[derive(Debug, PartialEq, Eq)]
enum Location {
    Remote(Url),
    Local(PathBuf),
}

fn parse_location(document: &str) -> Result<Location, AcquisitionError> {
    let invalid = || AcquisitionError::InvalidLocation {
        document: document.to_string(),
    };

    match Url::parse(document) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Location::Remote(url)),
            "file" => url.to_file_path().map(Location::Local).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        Err(_) => Ok(Location::Local(PathBuf::from(document))),
    }
}

/// Identify the document by content, falling back to the declared content type
/// only for the error message.
pub fn detect_format(
    bytes: &[u8],
    content_type: Option<&Mime>,
) -> Result<DocumentFormat, AcquisitionError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(DocumentFormat::Pdf);
    }

    if let Ok(format) = image::guess_format(bytes) {
        return Ok(DocumentFormat::Image(format));
    }

    Err(AcquisitionError::UnsupportedFormat {
        format: content_type
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Fetches documents and rasterizes them into page images
pub struct IngestionService {
    client: Client,
    config: AcquisitionConfig,
}

impl IngestionService {
    pub fn new(config: AcquisitionConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .user_agent(concat!("bill-extraction-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Fetch a document from an http(s) URL, a `file://` URL or a local path.
    pub async fn fetch(&self, document: &str) -> ServiceResult<SourceDocument> {
        let (bytes, content_type) = match parse_location(document)? {
            Location::Remote(url) => self.download(url).await?,
            Location::Local(path) => {
                if !self.config.allow_local_paths {
                    return Err(AcquisitionError::LocalPathsDisabled {
                        document: document.to_string(),
                    }
                    .into());
                }
                (self.read_local(&path).await?, None)
            }
        };

        let format = detect_format(&bytes, content_type.as_ref())?;
        let fingerprint = hash::document_fingerprint(&bytes);

        info!(
            size = bytes.len(),
            format = ?format,
            fingerprint = %fingerprint,
            "Document acquired"
        );

        Ok(SourceDocument {
            origin: document.to_string(),
            bytes,
            format,
            fingerprint,
        })
    }

    async fn download(&self, url: Url) -> Result<(Bytes, Option<Mime>), AcquisitionError> {
        let url_str = url.to_string();
        let max = self.config.max_document_size_bytes;

        let mut response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| AcquisitionError::Download {
                    url: url_str.clone(),
                    source: e,
                })?;

        if !response.status().is_success() {
            return Err(AcquisitionError::HttpStatus {
                url: url_str,
                status: response.status().as_u16(),
            });
        }

        if let Some(size) = response.content_length().filter(|&size| size > max) {
            return Err(AcquisitionError::TooLarge { size, max });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Mime>().ok());

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AcquisitionError::Download {
                url: url_str.clone(),
                source: e,
            })?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > max {
                return Err(AcquisitionError::TooLarge {
                    size: body.len() as u64,
                    max,
                });
            }
        }

        debug!(url = %url_str, size = body.len(), "Document downloaded");
        Ok((Bytes::from(body), content_type))
    }

    async fn read_local(&self, path: &Path) -> Result<Bytes, AcquisitionError> {
        let not_found = || AcquisitionError::NotFound {
            path: path.display().to_string(),
        };

        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => not_found(),
            _ => AcquisitionError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let max = self.config.max_document_size_bytes;
        if metadata.len() > max {
            return Err(AcquisitionError::TooLarge {
                size: metadata.len(),
                max,
            });
        }

        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(AcquisitionError::Io)
    }

    /// Rasterize a document page by page, in page order.
    ///
    /// Rendering runs ahead of the consumer by at most [`PAGE_BUFFER`] pages.
    pub fn page_images(&self, document: &SourceDocument) -> PageStream {
        let bytes = document.bytes.clone();
        let format = document.format;
        let dpi = self.config.render_dpi;
        let max_pages = self.config.max_pages;

        PageStream::spawn(move |emit| match format {
            DocumentFormat::Pdf => {
                let rendered = pdf::render_pdf_pages(&bytes, dpi, max_pages, emit)?;
                info!(pages = rendered, "Document rasterized");
                Ok(())
            }
            DocumentFormat::Image(format) => {
                let page = image::load_from_memory_with_format(&bytes, format)
                    .map_err(AcquisitionError::Decode)?;
                emit(page);
                Ok(())
            }
        })
    }
}

/// Pages of one document, produced on a blocking thread
pub struct PageStream {
    receiver: mpsc::Receiver<Result<DynamicImage, AcquisitionError>>,
    renderer: Option<JoinHandle<()>>,
}

impl PageStream {
    /// Run `render` on the blocking pool. It hands each page to the emitter,
    /// which returns `false` once the consumer is gone.
    fn spawn<F>(render: F) -> Self
    where
        F: FnOnce(&mut dyn FnMut(DynamicImage) -> bool) -> Result<(), AcquisitionError>
            + Send
            + 'static,
    {
        let (sender, receiver) = mpsc::channel(PAGE_BUFFER);

        let renderer = tokio::task::spawn_blocking(move || {
            let mut emit = |page: DynamicImage| sender.blocking_send(Ok(page)).is_ok();
            if let Err(e) = render(&mut emit) {
                // Nobody is left to tell if the receiver is closed.
                let _ = sender.blocking_send(Err(e));
            }
        });

        Self {
            receiver,
            renderer: Some(renderer),
        }
    }

    /// Next page, or `None` once every page has been delivered.
    pub async fn next_page(&mut self) -> ServiceResult<Option<DynamicImage>> {
        if let Some(page) = self.receiver.recv().await {
            return Ok(Some(page?));
        }

        if let Some(renderer) = self.renderer.take() {
            renderer.await.map_err(|e| ServiceError::Internal {
                message: format!("Page rendering task failed: {}", e),
            })?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use image::RgbImage;
    use std::io::{Cursor, Write};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn service(max_size: u64) -> IngestionService {
        IngestionService::new(AcquisitionConfig {
            download_timeout_secs: 5,
            max_document_size_bytes: max_size,
            render_dpi: 150,
            max_pages: 5,
            allow_local_paths: true,
        })
        .unwrap()
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_location() {
        assert!(matches!(
            parse_location("https://example.com/bill.pdf"),
            Ok(Location::Remote(_))
        ));
        assert_eq!(
            parse_location("file:///tmp/bill.png").unwrap(),
            Location::Local(PathBuf::from("/tmp/bill.png"))
        );
        assert_eq!(
            parse_location("bills/sample 1.png").unwrap(),
            Location::Local(PathBuf::from("bills/sample 1.png"))
        );
        assert!(matches!(
            parse_location("ftp://example.com/bill.pdf"),
            Err(AcquisitionError::InvalidLocation { .. })
        ));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format(b"%PDF-1.7\n...", None).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            detect_format(&png_bytes(2, 2), None).unwrap(),
            DocumentFormat::Image(ImageFormat::Png)
        );

        let html: Mime = "text/html; charset=utf-8".parse().unwrap();
        match detect_format(b"<html></html>", Some(&html)) {
            Err(AcquisitionError::UnsupportedFormat { format }) => assert_eq!(format, "text/html"),
            other => panic!("unexpected: {:?}", other),
        }
        match detect_format(b"plain text", None) {
            Err(AcquisitionError::UnsupportedFormat { format }) => assert_eq!(format, "unknown"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_local_image() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&png_bytes(40, 30)).unwrap();
        file.flush().unwrap();

        let ingestion = service(1024 * 1024);
        let doc = ingestion.fetch(file.path().to_str().unwrap()).await.unwrap();

        assert_eq!(doc.format, DocumentFormat::Image(ImageFormat::Png));
        assert_eq!(doc.fingerprint, hash::document_fingerprint(&doc.bytes));

        let mut pages = ingestion.page_images(&doc);
        let page = pages.next_page().await.unwrap().unwrap();
        assert_eq!((page.width(), page.height()), (40, 30));
        assert!(pages.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_paths_rejected_unless_enabled() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&png_bytes(4, 4)).unwrap();
        file.flush().unwrap();

        let ingestion = IngestionService::new(AcquisitionConfig {
            allow_local_paths: false,
            ..crate::config::AppConfig::default().acquisition
        })
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        for document in [path.clone(), format!("file://{}", path)] {
            let err = ingestion.fetch(&document).await.unwrap_err();
            assert!(matches!(
                err,
                ServiceError::Acquisition(AcquisitionError::LocalPathsDisabled { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_page_stream_renders_ahead_by_bounded_amount() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();

        let mut pages = PageStream::spawn(move |emit| {
            for _ in 0..5 {
                if !emit(DynamicImage::new_rgb8(4, 4)) {
                    break;
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        assert!(pages.next_page().await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(produced.load(Ordering::SeqCst) <= 1 + PAGE_BUFFER);

        let mut received = 1;
        while pages.next_page().await.unwrap().is_some() {
            received += 1;
        }
        assert_eq!(received, 5);
        assert_eq!(produced.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_page_stream_reports_render_error_after_pages() {
        let mut pages = PageStream::spawn(|emit| {
            emit(DynamicImage::new_rgb8(4, 4));
            Err(AcquisitionError::Render {
                page: 2,
                message: "bad page".to_string(),
            })
        });

        assert!(pages.next_page().await.unwrap().is_some());
        let err = pages.next_page().await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Acquisition(AcquisitionError::Render { page: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_page_stream_stops_renderer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        let mut pages = PageStream::spawn(move |emit| {
            for _ in 0..100 {
                if !emit(DynamicImage::new_rgb8(4, 4)) {
                    break;
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
            let _ = done_tx.send(());
            Ok(())
        });
        assert!(pages.next_page().await.unwrap().is_some());
        drop(pages);

        done_rx.await.unwrap();
        assert!(produced.load(Ordering::SeqCst) <= 1 + PAGE_BUFFER);
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let err = service(1024)
            .fetch("/nonexistent/bill-extraction/bill.png")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Acquisition(AcquisitionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_local_too_large() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&png_bytes(64, 64)).unwrap();
        file.flush().unwrap();

        let err = service(16)
            .fetch(file.path().to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Acquisition(AcquisitionError::TooLarge { max: 16, .. })
        ));
    }

    #[tokio::test]
    async fn test_download_image() {
        let png = png_bytes(8, 8);
        let body = png.clone();
        let base = serve(Router::new().route(
            "/bill.png",
            get(move || {
                let body = body.clone();
                async move { ([(CONTENT_TYPE, "image/png")], body) }
            }),
        ))
        .await;

        let doc = service(1024 * 1024)
            .fetch(&format!("{}/bill.png", base))
            .await
            .unwrap();

        assert_eq!(doc.bytes.as_ref(), png.as_slice());
        assert_eq!(doc.format, DocumentFormat::Image(ImageFormat::Png));
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let base = serve(Router::new().route(
            "/gone.pdf",
            get(|| async { StatusCode::NOT_FOUND }),
        ))
        .await;

        let err = service(1024)
            .fetch(&format!("{}/gone.pdf", base))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Acquisition(AcquisitionError::HttpStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_download_unsupported_content() {
        let base = serve(Router::new().route(
            "/page",
            get(|| async { ([(CONTENT_TYPE, "text/html")], "<html>not a bill</html>") }),
        ))
        .await;

        let err = service(1024)
            .fetch(&format!("{}/page", base))
            .await
            .unwrap_err();

        match err {
            ServiceError::Acquisition(AcquisitionError::UnsupportedFormat { format }) => {
                assert_eq!(format, "text/html")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
