//! Unit test suite

#[path = "unit/helpers.rs"]
mod helpers;
#[path = "unit/test_limiter.rs"]
mod test_limiter;
#[path = "unit/test_planner.rs"]
mod test_planner;
#[path = "unit/test_resume.rs"]
mod test_resume;
#[path = "unit/test_runner.rs"]
mod test_runner;
#[path = "unit/test_status.rs"]
mod test_status;
