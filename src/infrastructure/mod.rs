//! 基础设施层：持有文件与 PDF 库这类资源，只暴露能力

pub mod document_store;
pub mod pdf_engine;

pub use document_store::{DocumentStore, LocalDocumentStore};
pub use pdf_engine::{PageImage, PdfEngine, PdfiumEngine};
