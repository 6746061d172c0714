// Platform integrations backed by external runtimes

pub mod landmarks;
