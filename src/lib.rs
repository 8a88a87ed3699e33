pub mod alerts;
pub mod classify;
pub mod cli;
pub mod domain;
pub mod imagehash;
pub mod normalization;
pub mod persistence;
pub mod reconcile;
pub mod scheduler;
pub mod stores;
pub mod tracing;

pub mod util {
    pub mod env;
}
