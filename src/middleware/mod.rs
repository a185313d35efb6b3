// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules.

pub mod tasks_auth;

pub use tasks_auth::require_trigger_token;
