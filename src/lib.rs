//! Durable notification delivery on top of PostgreSQL.
//!
//! Producers enqueue [`EmailJob`]s with [`enqueue_email`], a [`Worker`] claims them
//! with bounded concurrency, renders the markdown into sanitized and CSS-inlined
//! HTML (see [`render`]) and hands the result to a [`DeliveryClient`].
//!
//! The queue itself is any [`JobStore`]: [`Client`] is the PostgreSQL one,
//! [`MemoryStore`] keeps everything in process.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod app;
mod client;
mod config;
mod email;
mod error;
mod job;
mod queue;
mod sql;
mod store;
mod utils;
mod worker;

pub mod delivery;
pub mod render;

pub use client::{Client, ClientBuilder};
pub use config::{Config, ConfigError, EmailDefaults, SmtpConfig, WorkerConfig};
pub use delivery::{DeliveryClient, DeliveryError, Message, Receipt, SendPolicy};
pub use email::{enqueue_email, EmailHandler, EmailJob, Recipients, SEND_EMAIL_QUEUE};
pub use error::Error;
pub use job::{ActiveJob, Job, JobBuilder, JobState};
pub use queue::QueueOptions;
pub use queue::QueueInfo;
pub use render::{Rendered, Renderer};
pub use store::{JobStore, MemoryStore};
pub use worker::{Handler, HandlerError, ShutdownHandle, Worker};

/// Schema the queue tables are installed into unless told otherwise.
pub const DEFAULT_SCHEMA: &str = "pgmailer";

pub(crate) const MINIMUM_SUPPORTED_APP_VERSION: u8 = 1;
pub(crate) const CURRENT_APP_VERSION: u8 = 1;
