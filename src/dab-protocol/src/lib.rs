// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON line control protocol for the announcement switching daemon.
//!
//! Commands, responses, envelope parsing and token checks shared by the
//! server and any client.

pub mod auth;
pub mod codec;
pub mod types;

pub use auth::{AuthError, NoAuthValidator, SimpleTokenValidator, TokenValidator};
pub use codec::{encode_response, parse_envelope, signal_from_parts};
pub use types::{ClientCommand, ClientEnvelope, ClientResponse};
