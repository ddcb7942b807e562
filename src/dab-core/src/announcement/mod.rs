// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! DAB announcement model (ETSI EN 300 401 clause 8.1.6).
//!
//! Announcement types map one-to-one onto the bit positions of the 16-bit
//! ASu (support, FIG 0/18) and ASw (switching, FIG 0/19) flag words.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod signal;
pub mod support;

/// Announcement type as defined by ETSI EN 300 401 Table 14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementType {
    Alarm,
    Traffic,
    TransportFlash,
    Warning,
    News,
    Weather,
    Event,
    SpecialEvent,
    ProgrammeInfo,
    Sport,
    Finance,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown announcement type '{0}'")]
pub struct ParseAnnouncementTypeError(pub String);

impl AnnouncementType {
    /// All types in flag bit order (most urgent first).
    pub const ALL: [AnnouncementType; 11] = [
        AnnouncementType::Alarm,
        AnnouncementType::Traffic,
        AnnouncementType::TransportFlash,
        AnnouncementType::Warning,
        AnnouncementType::News,
        AnnouncementType::Weather,
        AnnouncementType::Event,
        AnnouncementType::SpecialEvent,
        AnnouncementType::ProgrammeInfo,
        AnnouncementType::Sport,
        AnnouncementType::Finance,
    ];

    /// Bit position in the ASu/ASw flag word.
    pub fn bit(self) -> u8 {
        self as u8
    }

    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(bit as usize).copied()
    }

    /// Default urgency for signals that carry no explicit priority.
    ///
    /// Higher is more urgent: Alarm is 11, Finance is 1.
    pub fn default_priority(self) -> i32 {
        Self::ALL.len() as i32 - self.bit() as i32
    }

    /// Stable machine key, used by the control protocol and CSV export.
    pub fn key(self) -> &'static str {
        match self {
            Self::Alarm => "alarm",
            Self::Traffic => "traffic",
            Self::TransportFlash => "transport_flash",
            Self::Warning => "warning",
            Self::News => "news",
            Self::Weather => "weather",
            Self::Event => "event",
            Self::SpecialEvent => "special_event",
            Self::ProgrammeInfo => "programme_info",
            Self::Sport => "sport",
            Self::Finance => "finance",
        }
    }

    /// English display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Alarm => "Alarm",
            Self::Traffic => "Road Traffic",
            Self::TransportFlash => "Transport Flash",
            Self::Warning => "Warning/Service",
            Self::News => "News Flash",
            Self::Weather => "Area Weather",
            Self::Event => "Event Announcement",
            Self::SpecialEvent => "Special Event",
            Self::ProgrammeInfo => "Programme Information",
            Self::Sport => "Sport Report",
            Self::Finance => "Financial Report",
        }
    }

    /// Thai display name.
    pub fn name_th(self) -> &'static str {
        match self {
            Self::Alarm => "การเตือนภัยฉุกเฉิน",
            Self::Traffic => "ข่าวจราจร",
            Self::TransportFlash => "ข่าวการเดินทาง",
            Self::Warning => "คำเตือน/บริการ",
            Self::News => "ข่าวด่วน",
            Self::Weather => "พยากรณ์อากาศ",
            Self::Event => "ประกาศเหตุการณ์",
            Self::SpecialEvent => "เหตุการณ์พิเศษ",
            Self::ProgrammeInfo => "ข้อมูลรายการ",
            Self::Sport => "ข่าวกีฬา",
            Self::Finance => "ข่าวการเงิน",
        }
    }
}

impl fmt::Display for AnnouncementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnnouncementType {
    type Err = ParseAnnouncementTypeError;

    /// Accepts the machine key, the English name, or a few common aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        let normalized: String = wanted
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let alias = match normalized.as_str() {
            "roadtraffic" | "ta" => Some(Self::Traffic),
            "financial" => Some(Self::Finance),
            "programmeinformation" | "programinfo" => Some(Self::ProgrammeInfo),
            _ => None,
        };
        if let Some(ty) = alias {
            return Ok(ty);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|ty| {
                let key: String = ty.key().chars().filter(|c| *c != '_').collect();
                key == normalized || ty.name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ParseAnnouncementTypeError(wanted.to_string()))
    }
}

/// 16-bit ASu/ASw flag word; bit N set means type N is supported/active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnouncementFlags(pub u16);

impl AnnouncementFlags {
    pub const NONE: AnnouncementFlags = AnnouncementFlags(0);

    pub fn set(&mut self, ty: AnnouncementType) {
        self.0 |= 1 << ty.bit();
    }

    pub fn clear(&mut self, ty: AnnouncementType) {
        self.0 &= !(1 << ty.bit());
    }

    pub fn contains(self, ty: AnnouncementType) -> bool {
        self.0 & (1 << ty.bit()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Types present in the flag word, most urgent first. Reserved bits
    /// 11..=15 are ignored.
    pub fn types(self) -> impl Iterator<Item = AnnouncementType> {
        AnnouncementType::ALL
            .into_iter()
            .filter(move |ty| self.contains(*ty))
    }

    /// Most urgent type present, if any.
    pub fn most_urgent(self) -> Option<AnnouncementType> {
        self.types().next()
    }
}

impl FromIterator<AnnouncementType> for AnnouncementFlags {
    fn from_iter<I: IntoIterator<Item = AnnouncementType>>(iter: I) -> Self {
        let mut flags = AnnouncementFlags::NONE;
        for ty in iter {
            flags.set(ty);
        }
        flags
    }
}

/// Identifier of a service or sub-channel within the tuned ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        ChannelId(value.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        ChannelId(value)
    }
}
