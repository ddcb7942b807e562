// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::announcement::ChannelId;
use crate::history::FailureReason;

/// Alias to reduce type complexity in [`Tuner`].
pub type TuneFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TuneError>> + Send + 'a>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TuneError {
    #[error("sub-channel {0} not found in ensemble")]
    SubchannelNotFound(ChannelId),
    #[error("service {0} cannot be selected")]
    ServiceUnsupported(ChannelId),
    #[error("tuner fault: {0}")]
    Fault(String),
}

impl TuneError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::SubchannelNotFound(_) => FailureReason::SubchannelNotFound,
            Self::ServiceUnsupported(_) => FailureReason::ServiceUnsupported,
            Self::Fault(_) => FailureReason::TunerFault,
        }
    }
}

/// Receiver front end that can switch audio decoding to another sub-channel.
pub trait Tuner: Send + Sync {
    /// Select `channel`; resolves once audio is coming from it.
    fn retune<'a>(&'a self, channel: &'a ChannelId) -> TuneFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_maps_to_failure_reason() {
        let err = TuneError::SubchannelNotFound(ChannelId::from("T9"));
        assert_eq!(err.reason(), FailureReason::SubchannelNotFound);
        assert_eq!(err.to_string(), "sub-channel T9 not found in ensemble");
        assert_eq!(
            TuneError::Fault("i2c".into()).reason(),
            FailureReason::TunerFault
        );
    }
}
