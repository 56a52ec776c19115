#![forbid(unsafe_code)]

pub mod archive;
pub mod bagit;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod mets;
pub mod package;
pub mod pipeline;
pub mod verify;
