// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared defaults for the dubber binary.

/// Default configuration file path.
pub const DEFAULT_CONFIG_FILE: &str = "dubber.yaml";

/// Default metrics listen address. An empty address disables the endpoint.
pub const DEFAULT_METRICS_ADDR: &str = ":8080";

/// Default interval between discovery polls.
pub const DEFAULT_POLL_INTERVAL: &str = "1m";
