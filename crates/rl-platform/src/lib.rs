pub mod analyzer;
pub mod client;
pub mod error;
pub mod types;

pub use analyzer::{AnalysisRequest, Analyzer, ArchFile, ArchInput, OpenAiAnalyzer, PriorFinding};
pub use client::{AzureClient, Platform, PlatformRepo};
pub use error::{AnalyzerError, PlatformError};
