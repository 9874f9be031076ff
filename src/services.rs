pub mod access_service;
pub mod diagnostic_service;
pub mod geography_service;
pub mod propagation_service;
pub mod report_service;

pub use access_service::AccessService;
pub use diagnostic_service::DiagnosticService;
pub use geography_service::GeographyService;
pub use propagation_service::PropagationService;
pub use report_service::ReportService;
