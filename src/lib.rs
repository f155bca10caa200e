//! Stream Resolver Library
//!
//! This library turns a streaming site's detail or episode page into playable
//! media links. Pages are fetched, source descriptors are located with a
//! declarative per-site profile, and each descriptor is resolved through
//! embed hosts up to a depth ceiling. An actix-web service exposes it over HTTP.

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod extractors;
pub mod fetch;
pub mod locator;
pub mod models;
pub mod parser;
pub mod resolver;
pub mod routes;
pub mod urls;
