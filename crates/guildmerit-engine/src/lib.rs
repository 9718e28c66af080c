pub mod apply;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod reports;

pub use apply::{Applied, apply_assignment_decisions, apply_role_decisions};
pub use error::{EngineError, EngineResult};
pub use identity::{IdentitySource, ResolvedIdentities, resolve_identities};
pub use orchestrator::{Adapters, CycleReport, GITHUB_CURSOR, Orchestrator};
pub use reports::{ACTIVITY_MARKDOWN_FILE, AUDIT_JSON_FILE, AUDIT_MARKDOWN_FILE, FileReportSink};
