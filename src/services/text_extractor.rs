//! 文档文本提取 - 业务能力层
//!
//! 只负责"给一个路径，拿回文本"：
//! 1. 先读文档内嵌的文本层（PDF / DOCX / 纯文本）
//! 2. PDF 没有可用文本层时，逐页渲染后 OCR，按页序直接拼接（页间不加分隔符）；
//!    只有部分页缺少文本层时，只对这些页 OCR，结果按页序与文本层用换行拼接
//! 3. 两条路径都拿不到文本时返回 `NoText`，绝不返回空文本

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::infrastructure::{DocumentStore, PdfEngine};
use crate::models::grading::{ExtractedText, ExtractionMethod};
use crate::services::ocr::OcrEngine;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError>;
}

/// 支持的文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "txt" | "md" => Ok(Self::PlainText),
            _ => Err(ExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

/// 文档提取器
pub struct DocumentExtractor {
    store: Arc<dyn DocumentStore>,
    pdf: Arc<dyn PdfEngine>,
    ocr: Arc<dyn OcrEngine>,
}

impl DocumentExtractor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        pdf: Arc<dyn PdfEngine>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self { store, pdf, ocr }
    }

    async fn extract_pdf(
        &self,
        path: &Path,
        bytes: Vec<u8>,
    ) -> Result<(String, ExtractionMethod), ExtractionError> {
        let bytes = Arc::new(bytes);

        let engine = self.pdf.clone();
        let pdf_bytes = bytes.clone();
        let page_texts = tokio::task::spawn_blocking(move || engine.page_texts(&pdf_bytes))
            .await
            .map_err(|e| corrupt(path, e))?
            .map_err(|source| ExtractionError::Pdf {
                path: path.to_path_buf(),
                source,
            })?;

        let blank_pages: Vec<usize> = page_texts
            .iter()
            .enumerate()
            .filter(|(_, text)| text.trim().is_empty())
            .map(|(idx, _)| idx + 1)
            .collect();
        if blank_pages.is_empty() {
            return Ok((page_texts.join("\n"), ExtractionMethod::Direct));
        }

        let scanned = blank_pages.len() == page_texts.len();
        if scanned {
            info!(
                "📷 {} 没有文本层，共 {} 页，改用 OCR",
                path.display(),
                page_texts.len()
            );
        } else {
            warn!(
                "⚠️ {} 有 {}/{} 页没有文本层，对这些页 OCR",
                path.display(),
                blank_pages.len(),
                page_texts.len()
            );
        }

        let engine = self.pdf.clone();
        let pages = tokio::task::spawn_blocking(move || engine.render_pages(&bytes))
            .await
            .map_err(|e| corrupt(path, e))?
            .map_err(|source| ExtractionError::Pdf {
                path: path.to_path_buf(),
                source,
            })?;

        let mut recognized = Vec::with_capacity(blank_pages.len());
        for page in pages
            .iter()
            .filter(|page| blank_pages.contains(&page.page_number))
        {
            let page_text = self
                .ocr
                .recognize(page)
                .await
                .map_err(|source| ExtractionError::Ocr {
                    path: path.to_path_buf(),
                    page: page.page_number,
                    source,
                })?;
            debug!(
                "第 {}/{} 页 OCR 完成: {} 字符",
                page.page_number,
                pages.len(),
                page_text.chars().count()
            );
            recognized.push((page.page_number, page_text));
        }

        // 全部是扫描页时 OCR 结果直接拼接；混合文档按页序用换行拼接
        let text: String = if scanned {
            recognized.into_iter().map(|(_, text)| text).collect()
        } else {
            page_texts
                .into_iter()
                .enumerate()
                .map(|(idx, text)| {
                    recognized
                        .iter()
                        .find(|(page_number, _)| *page_number == idx + 1)
                        .map(|(_, ocr_text)| ocr_text.clone())
                        .unwrap_or(text)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok((text, ExtractionMethod::Ocr))
    }

    async fn extract_docx(&self, path: &Path, bytes: Vec<u8>) -> Result<String, ExtractionError> {
        tokio::task::spawn_blocking(move || docx_text(&bytes))
            .await
            .map_err(|e| corrupt(path, e))?
            .map_err(|message| ExtractionError::Corrupt {
                path: path.to_path_buf(),
                message,
            })
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        let format = DocumentFormat::from_path(path)?;
        let bytes = self
            .store
            .read_file(path)
            .await
            .map_err(|source| ExtractionError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let (text, method) = match format {
            DocumentFormat::PlainText => (
                String::from_utf8_lossy(&bytes).into_owned(),
                ExtractionMethod::Direct,
            ),
            DocumentFormat::Docx => (
                self.extract_docx(path, bytes).await?,
                ExtractionMethod::Direct,
            ),
            DocumentFormat::Pdf => self.extract_pdf(path, bytes).await?,
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::NoText {
                path: path.to_path_buf(),
            });
        }

        debug!(
            "提取完成 {}: {} 字符 ({:?})",
            path.display(),
            text.chars().count(),
            method
        );

        Ok(ExtractedText {
            source_path: PathBuf::from(path),
            text,
            method,
        })
    }
}

fn corrupt(path: &Path, e: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Corrupt {
        path: path.to_path_buf(),
        message: format!("解析任务异常: {}", e),
    }
}

// ========== DOCX ==========

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let docx = docx_rs::read_docx(bytes).map_err(|e| format!("DOCX 解析失败: {:?}", e))?;

    let mut out = String::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(para) => {
                let line = paragraph_text(para);
                if !line.trim().is_empty() {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
            docx_rs::DocumentChild::Table(table) => table_text(table, &mut out),
            _ => {}
        }
    }

    Ok(out.trim().to_string())
}

// 删除修订中的文本不算作答案内容
fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut line = String::new();
    for child in &para.children {
        match child {
            docx_rs::ParagraphChild::Run(run) => run_text(run, &mut line),
            docx_rs::ParagraphChild::Hyperlink(hyperlink) => {
                for child in &hyperlink.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        run_text(run, &mut line);
                    }
                }
            }
            docx_rs::ParagraphChild::Insert(insert) => {
                for child in &insert.children {
                    if let docx_rs::InsertChild::Run(run) = child {
                        run_text(run, &mut line);
                    }
                }
            }
            _ => {}
        }
    }
    line
}

fn run_text(run: &docx_rs::Run, out: &mut String) {
    for child in &run.children {
        match child {
            docx_rs::RunChild::Text(t) => out.push_str(&t.text),
            docx_rs::RunChild::Tab(_) => out.push('\t'),
            docx_rs::RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn table_text(table: &docx_rs::Table, out: &mut String) {
    for child in &table.rows {
        let docx_rs::TableChild::TableRow(row) = child else {
            continue;
        };
        let mut cells = Vec::new();
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell else {
                continue;
            };
            let text = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    docx_rs::TableCellContent::Paragraph(para) => Some(paragraph_text(para)),
                    _ => None,
                })
                .filter(|t| !t.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            cells.push(text);
        }
        if cells.iter().any(|c| !c.is_empty()) {
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
    }
}
