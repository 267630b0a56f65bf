//! PDF 引擎 - 基础设施层
//!
//! 只暴露两种能力：读取每页文本层、把每页渲染成 JPEG。
//! 不关心 OCR，也不关心评分流程。

use std::io::Cursor;
use std::path::PathBuf;

use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::PdfError;
use crate::models::evidence::EvidenceBlock;

/// 渲染后的单页图片
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    /// 页码（从 1 开始）
    pub page_number: usize,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PageImage {
    pub fn jpeg(page_number: usize, bytes: Vec<u8>) -> Self {
        Self {
            page_number,
            mime_type: "image/jpeg".to_string(),
            bytes,
        }
    }

    pub fn to_evidence(&self) -> EvidenceBlock {
        EvidenceBlock::image(self.mime_type.clone(), &self.bytes)
    }
}

/// PDF 能力
///
/// 两个方法都是 CPU 密集的同步调用，调用方负责放进 `spawn_blocking`。
pub trait PdfEngine: Send + Sync {
    /// 按页序返回每页的文本层（可能为空字符串）
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, PdfError>;

    /// 按页序把每页渲染成图片
    fn render_pages(&self, bytes: &[u8]) -> Result<Vec<PageImage>, PdfError>;
}

/// 基于 pdfium 的实现
///
/// 每次调用单独绑定动态库：先试配置的路径，再回退到系统库。
#[derive(Debug, Clone)]
pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
    target_width: i32,
    max_height: i32,
}

impl PdfiumEngine {
    /// 150 DPI 下的 A4 尺寸
    pub const DEFAULT_TARGET_WIDTH: i32 = 1240;
    pub const DEFAULT_MAX_HEIGHT: i32 = 1754;

    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self {
            library_path,
            target_width: Self::DEFAULT_TARGET_WIDTH,
            max_height: Self::DEFAULT_MAX_HEIGHT,
        }
    }

    fn bind(&self) -> Result<Pdfium, PdfError> {
        if let Some(path) = &self.library_path {
            match Pdfium::bind_to_library(path) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => debug!("[Pdfium] 绑定 {:?} 失败，回退系统库: {:?}", path, e),
            }
        }

        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| PdfError::LibraryUnavailable(format!("{:?}", e)))
    }
}

impl PdfEngine for PdfiumEngine {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, PdfError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::Load(format!("{:?}", e)))?;

        let mut texts = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            match page.text() {
                Ok(text_page) => texts.push(text_page.all()),
                Err(e) => {
                    debug!("[Pdfium] 第 {} 页没有文本层: {:?}", index + 1, e);
                    texts.push(String::new());
                }
            }
        }

        Ok(texts)
    }

    fn render_pages(&self, bytes: &[u8]) -> Result<Vec<PageImage>, PdfError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::Load(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.target_width)
            .set_maximum_height(self.max_height);

        let mut pages = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let page_number = index + 1;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| PdfError::Render {
                    page: page_number,
                    message: format!("{:?}", e),
                })?;

            let rgb_image = bitmap.as_image().to_rgb8();
            let mut jpeg_buffer = Cursor::new(Vec::new());
            rgb_image
                .write_to(&mut jpeg_buffer, image::ImageFormat::Jpeg)
                .map_err(|e| PdfError::Render {
                    page: page_number,
                    message: format!("JPEG 编码失败: {}", e),
                })?;

            pages.push(PageImage::jpeg(page_number, jpeg_buffer.into_inner()));
        }

        debug!("[Pdfium] 渲染完成，共 {} 页", pages.len());
        Ok(pages)
    }
}
