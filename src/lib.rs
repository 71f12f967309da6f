//! Redis data source backend.
//!
//! Translates dashboard queries into Redis commands and reshapes the
//! replies into typed, column-oriented frames. The binary speaks a
//! line-delimited JSON protocol with its host (see [`server`]); the library
//! exposes every layer for embedding and testing:
//!
//! - [`resp`], [`connection`], [`router`]: wire protocol, pooled
//!   connections and topology routing (standalone, cluster, sentinel);
//! - [`client`]: the synchronous command surface decoders use;
//! - [`commands`], [`dispatch`], [`streaming`]: per-command decoders and
//!   query routing;
//! - [`datasource`]: per-data-source instances, queries and health checks.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod crc16;
pub mod datasource;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod query;
pub mod resp;
pub mod router;
pub mod runtime;
pub mod server;
pub mod streaming;

pub use client::{Client, FlatArg, FlatCommand, RedisClient};
pub use datasource::{Datasource, HealthResult, HealthStatus, PluginContext};
pub use error::{DatasourceError, Result};
pub use frame::{Column, ColumnValues, Frame};
pub use query::{DataQuery, DataResponse, QueryContext, QueryModel};
