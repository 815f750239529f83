pub mod aggregate;
pub mod finding;
pub mod login;
pub mod probe;
pub mod session;
pub mod target;

pub use aggregate::{Aggregator, FindingsReport, SeverityCounts};
pub use finding::{Confidence, Finding, Severity, VulnKind};
pub use login::{FormLogin, LoginError, LoginFlow};
pub use probe::{Detector, DomRenderer, ProbeContext, ProbeError, ProbeSet, RenderedDom};
pub use session::{ScanSession, SessionError, run_scan, run_scan_blocking};
pub use target::{ConfigError, Credentials, ProbeTuning, Target, TargetBuilder};
