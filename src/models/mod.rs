// Data models for policies, verdicts, landmarks, frames and evidence

pub mod frame;
pub mod landmarks;
pub mod policy;
pub mod session;
pub mod verdict;
