//! Row types and DTOs.

pub mod retry_request;
pub mod team;
pub mod test_result;
