//! Common test utilities for the conformance harness.
//!
//! This module provides test infrastructure including:
//!
//! - [`live`] - Gating and helpers for scenarios against a live server
//! - [`stub`] - In-process stub server that records requests

#![allow(dead_code)]

pub mod live;
pub mod stub;
