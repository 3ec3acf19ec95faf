//! Chip (channel) ordering families.
//!
//! The device reports the wiring order of the attached strip as an index
//! into the permutation list of the configured family, e.g. index 2 of the
//! RGB family is "GRB".

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipOrder {
    /// Cold / warm white
    Cw,
    /// Single color SPI pixels
    OneTwoThree,
    /// Cold / warm white on a three channel SPI chip
    Cwx,
    Rgb,
    Rgbw,
    Rgbcw,
}

impl ChipOrder {
    /// Canonical channel letters of the family
    pub const fn letters(self) -> &'static str {
        match self {
            ChipOrder::Cw => "CW",
            ChipOrder::OneTwoThree => "123",
            ChipOrder::Cwx => "CWX",
            ChipOrder::Rgb => "RGB",
            ChipOrder::Rgbw => "RGBW",
            ChipOrder::Rgbcw => "RGBCW",
        }
    }

    /// Number of physical channels
    pub const fn channels(self) -> usize {
        self.letters().len()
    }

    /// All orderings in the device's index order
    pub fn permutations(self) -> Vec<String> {
        let mut out = Vec::new();
        let mut letters: Vec<char> = self.letters().chars().collect();
        permute(&mut letters, 0, &mut out);
        out
    }

    /// Name of the ordering at `index`
    pub fn name(self, index: u8) -> Option<String> {
        self.permutations().into_iter().nth(usize::from(index))
    }

    /// Index of a named ordering (case insensitive)
    pub fn index(self, name: &str) -> Option<u8> {
        self.permutations()
            .iter()
            .position(|order| order.eq_ignore_ascii_case(name.trim()))
            .and_then(|index| u8::try_from(index).ok())
    }
}

/// Lexicographic (by canonical position) permutations, canonical order first
fn permute(letters: &mut [char], start: usize, out: &mut Vec<String>) {
    if start == letters.len() {
        out.push(letters.iter().collect());
        return;
    }
    for i in start..letters.len() {
        // rotate keeps the tail in canonical relative order
        letters[start..=i].rotate_right(1);
        permute(letters, start + 1, out);
        letters[start..=i].rotate_left(1);
    }
}

impl fmt::Display for ChipOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letters())
    }
}
