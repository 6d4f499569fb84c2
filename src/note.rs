//! Pitch-class names for the twelve keys of one keyboard octave.
//!
//! A `NoteName` identifies a key on the board, not an absolute pitch: the
//! keyboard spans a single octave and every persisted note block carries one
//! of these twelve names. Input is case-insensitive; the canonical form is
//! upper case ("C", "C#", ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the twelve pitch classes (7 naturals + 5 accidentals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteName {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

/// Error returned when a string is not a recognizable note name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown note name: {0:?}")]
pub struct ParseNoteError(pub String);

impl NoteName {
    /// All twelve pitch classes in chromatic order, C first.
    ///
    /// This is also the top-to-bottom row order of keys on the board.
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Canonical upper-case label ("C", "C#", ...).
    pub fn label(&self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }

    /// Chromatic index within the octave (C = 0 ... B = 11).
    pub fn pitch_index(&self) -> usize {
        Self::ALL.iter().position(|n| n == self).unwrap_or(0)
    }

    /// Whether this is one of the five accidentals (black keys).
    pub fn is_accidental(&self) -> bool {
        matches!(
            self,
            NoteName::CSharp
                | NoteName::DSharp
                | NoteName::FSharp
                | NoteName::GSharp
                | NoteName::ASharp
        )
    }

    /// MIDI note number for this pitch class in the board's fixed octave.
    ///
    /// The board plays the octave starting at C3 in MIDI numbering
    /// (C = 48 ... B = 59).
    #[allow(dead_code)]
    pub fn midi_number(&self) -> u8 {
        48 + self.pitch_index() as u8
    }

    /// Pitch class for a MIDI note number, folding into one octave.
    #[allow(dead_code)]
    pub fn from_midi(midi: u8) -> NoteName {
        Self::ALL[(midi % 12) as usize]
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NoteName {
    type Err = ParseNoteError;

    /// Parses a note name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|n| n.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseNoteError(s.to_string()))
    }
}
