//! Client code for cachewarden.
//!
//! This crate provides the network transport and the caching worker that
//! routes requests between the cache store and the network. The server
//! crate hosts it.

pub mod fetch;
pub mod worker;

pub use fetch::{FetchClient, FetchConfig, Network, Request, Response};

pub use worker::{
    ActivateReport, ControlMessage, FailedUrl, FetchOutcome, InstallReport, LifecycleState, LifecycleStatus,
    MessageOutcome, PerformanceMeasure, PreloadReport, RequestClass, ResponseSource, ServiceWorker, Strategy,
    WorkerConfig, WorkerEvent,
};
