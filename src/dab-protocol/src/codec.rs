// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Envelope parsing and response encoding.

use dab_core::{AnnouncementSignal, AnnouncementType, SignalKind};

use crate::types::{ClientCommand, ClientEnvelope, ClientResponse};

/// Parse a JSON string into a ClientEnvelope.
///
/// A bare command without a `token` field is accepted and wrapped with
/// `token: None`.
pub fn parse_envelope(input: &str) -> Result<ClientEnvelope, serde_json::Error> {
    match serde_json::from_str::<ClientEnvelope>(input) {
        Ok(envelope) => Ok(envelope),
        Err(_) => {
            let cmd = serde_json::from_str::<ClientCommand>(input)?;
            Ok(ClientEnvelope { token: None, cmd })
        }
    }
}

/// Serialize a response as one protocol line (newline-terminated).
pub fn encode_response(response: &ClientResponse) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    Ok(line)
}

/// Build a signal from the fields of a `signal` command.
pub fn signal_from_parts(
    announcement_type: AnnouncementType,
    cluster: u8,
    target: &str,
    priority: Option<i32>,
    kind: SignalKind,
) -> AnnouncementSignal {
    let mut signal = match kind {
        SignalKind::Start => AnnouncementSignal::start(
            announcement_type,
            cluster,
            target,
            announcement_type.default_priority(),
        ),
        SignalKind::Stop => AnnouncementSignal::stop(announcement_type, cluster, target),
    };
    if let Some(priority) = priority {
        signal.priority = priority;
    }
    signal
}
