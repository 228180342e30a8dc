//! # Contact Trigger Interface
//!
//! Every time the drumstick strikes a drum a single text line is sent to the percussion
//! synthesiser (a Pure Data patch reading its standard input):
//!
//! - `<target_id> <level> <sustain>;` for the level and sustain scheme,
//! - `<target_id> <level>;` for the velocity only scheme.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A contact onset on a target.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    /// ID of the struck target
    pub target_id: u32,

    /// Strike level, derived from the strike speed
    pub level: f64,

    /// Sustain, derived from how close to the center the target was struck
    pub sustain: f64,
}

/// Writes contact events as trigger lines to an output stream.
pub struct TriggerWriter<W: Write> {
    out: W,
    format: TriggerFormat,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The trigger line format expected by the synthesiser.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerFormat {
    /// `<target_id> <level> <sustain>;`
    LevelSustain,

    /// `<target_id> <level>;`
    LevelOnly,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ContactEvent {
    /// Format this event as a trigger line, without the trailing newline.
    pub fn to_message(&self, format: TriggerFormat) -> String {
        match format {
            TriggerFormat::LevelSustain => {
                format!("{} {} {};", self.target_id, self.level, self.sustain)
            }
            TriggerFormat::LevelOnly => format!("{} {};", self.target_id, self.level),
        }
    }
}

impl Default for TriggerFormat {
    fn default() -> Self {
        TriggerFormat::LevelSustain
    }
}

impl<W: Write> TriggerWriter<W> {
    pub fn new(out: W, format: TriggerFormat) -> Self {
        Self { out, format }
    }

    /// Write one event and flush so the synthesiser receives it immediately.
    pub fn send(&mut self, event: &ContactEvent) -> io::Result<()> {
        writeln!(self.out, "{}", event.to_message(self.format))?;
        self.out.flush()
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn format(&self) -> TriggerFormat {
        self.format
    }

    /// Get back the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl TriggerWriter<io::Stdout> {
    /// Writer publishing on standard output.
    pub fn stdout(format: TriggerFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        let event = ContactEvent {
            target_id: 2,
            level: 1.5,
            sustain: 250.0,
        };

        assert_eq!(event.to_message(TriggerFormat::LevelSustain), "2 1.5 250;");
        assert_eq!(event.to_message(TriggerFormat::LevelOnly), "2 1.5;");
    }

    #[test]
    fn test_writer() {
        let mut writer = TriggerWriter::new(Vec::new(), TriggerFormat::LevelSustain);

        writer
            .send(&ContactEvent {
                target_id: 0,
                level: 3.0,
                sustain: 500.0,
            })
            .unwrap();
        writer
            .send(&ContactEvent {
                target_id: 1,
                level: 0.75,
                sustain: 0.0,
            })
            .unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out, "0 3 500;\n1 0.75 0;\n");
    }
}
