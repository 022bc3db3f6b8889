//! Montage: accepts timeline designs over HTTP and renders them to video in the
//! background through an external renderer, exposing job progress for polling.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
