//! Query functions, one zero-sized repo type per table.

pub mod artifact_repo;
pub mod retry_request_repo;
pub mod team_repo;
pub mod test_case_repo;
pub mod test_result_repo;

pub use artifact_repo::ArtifactRepo;
pub use retry_request_repo::RetryRequestRepo;
pub use team_repo::TeamRepo;
pub use test_case_repo::TestCaseRepo;
pub use test_result_repo::TestResultRepo;
