#![forbid(unsafe_code)]

mod demo;
mod dry_run;
mod jsonl;

pub use demo::DemoSource;
pub use dry_run::DryRunPlatform;
pub use jsonl::JsonLinesSource;
