//! unified-ci checks
//!
//! Pull-request checks and the adapters they talk through:
//! - the package vulnerability pipeline
//! - the hosting-provider check-run client (GitHub)
//! - the vulnerability scanner client (riki)
//! - the check runner that drives a pipeline from a queued request

pub mod check_run;
pub mod ecosystem;
pub mod error;
pub mod fakes;
pub mod finding;
pub mod probe;
pub mod provider;
pub mod runner;
pub mod scanner;
pub mod vulnerability;

pub use check_run::{Annotation, CheckRef, CheckRun, CheckRunUpdate, Conclusion, PullRequest};
pub use ecosystem::Ecosystem;
pub use error::{CheckError, Result};
pub use finding::Finding;
pub use provider::{CheckRunClient, CheckRunClientFactory, GitHubChecks, GitHubChecksFactory};
pub use runner::CheckRunner;
pub use scanner::{RikiScanner, ScanSession, Scanner, Submission};
pub use vulnerability::{VulnerabilityCheck, VulnerabilityInput, CHECK_NAME, NO_VULNERABILITIES};
