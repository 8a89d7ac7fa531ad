//! Messages exchanged with the verdict service.

pub mod frame;
pub mod report;
pub mod verdict;

pub use frame::{
    AuthRequest, AuthResponse, ErrorFrame, Frame, RequestFlags, VerdictRequest, VerdictRequestForStream,
    VerdictRequestForUrl,
};
pub use report::{FileAnalysisStarted, FileReport, ProblemBody, UrlAnalysisRequest, UrlAnalysisStarted, UrlReport};
pub use verdict::{UploadTicket, Verdict, VerdictReport, VerdictResponse};
