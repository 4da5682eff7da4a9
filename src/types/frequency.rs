//! Radio frequency values and their wire encodings
//!
//! Frequencies are held as an integer number of kHz (thousandths of a MHz),
//! which is the precision users enter and the precision both encodings carry.
//!
//! ## Encodings
//!
//! - [`FrequencyEncoding::RawHz`]: plain Hz as `u32`, `123.450 MHz -> 123_450_000`
//! - [`FrequencyEncoding::Bcd16`]: one decimal digit per nibble. The whole-MHz
//!   digits (hundreds, tens, units) fill the low half-word and the kHz digits
//!   fill the high half-word, each right-aligned:
//!
//! ```text
//!  31   28 27  24 23  20 19  16 15  12 11   8 7    4 3    0
//! +-------+------+------+------+------+------+------+------+
//! |   0   | kHz  | kHz  | kHz  |   0  | MHz  | MHz  | MHz  |
//! |       | 100s | 10s  | 1s   |      | 100s | 10s  | 1s   |
//! +-------+------+------+------+------+------+------+------+
//!
//! 122.800 MHz -> 0x0800_0122
//! 136.975 MHz -> 0x0975_0136
//! ```
//!
//! A BCD16 word looks like the decimal value but is not numerically related
//! to the Hz value; never compare the two.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BridgeError, Result};

const KHZ_PER_MHZ: u32 = 1_000;
const HZ_PER_KHZ: u32 = 1_000;
const MAX_FRACTION_DIGITS: usize = 3;
/// Largest frequency whose Hz value fits in `u32`.
const MAX_KHZ: u32 = u32::MAX / HZ_PER_KHZ;
/// Largest whole-MHz part representable with three BCD digits.
const MAX_BCD_WHOLE: u32 = 999;

/// A radio frequency with kHz precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Frequency {
    khz: u32,
}

impl Frequency {
    /// Build from a kHz count, rejecting values whose Hz form overflows `u32`.
    pub fn from_khz(khz: u32) -> Result<Self> {
        if khz > MAX_KHZ {
            return Err(BridgeError::encoding_rejected(
                format!("{} kHz", khz),
                "frequency does not fit in a 32-bit Hz value",
            ));
        }
        Ok(Self { khz })
    }

    /// Parse user input in MHz, e.g. `"123.450"`, `"118"`, `"121.5"`.
    ///
    /// Parsing is exact: digits are read as integers, never through `f64`.
    /// Signs, exponents, separators and more than three fractional digits are
    /// rejected.
    pub fn parse_mhz(input: &str) -> Result<Self> {
        let text = input.trim();
        let reject = |reason: &str| BridgeError::encoding_rejected(text, reason);

        if text.is_empty() {
            return Err(reject("no frequency entered"));
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (text, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(reject("no digits"));
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(reject("not a decimal number"));
        }
        if fraction.len() > MAX_FRACTION_DIGITS {
            return Err(reject("at most three fractional digits are allowed"));
        }

        let whole_mhz: u32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| reject("whole part is too large"))?
        };

        let mut fraction_khz: u32 = 0;
        for (i, digit) in fraction.bytes().enumerate() {
            let place = 10u32.pow((MAX_FRACTION_DIGITS - 1 - i) as u32);
            fraction_khz += u32::from(digit - b'0') * place;
        }

        let khz = whole_mhz
            .checked_mul(KHZ_PER_MHZ)
            .and_then(|k| k.checked_add(fraction_khz))
            .ok_or_else(|| reject("frequency does not fit in a 32-bit Hz value"))?;

        Self::from_khz(khz).map_err(|_| reject("frequency does not fit in a 32-bit Hz value"))
    }

    /// Build from a floating point MHz value, rounded to the nearest kHz.
    pub fn from_mhz(mhz: f64) -> Result<Self> {
        if !mhz.is_finite() || mhz < 0.0 {
            return Err(BridgeError::encoding_rejected(
                mhz.to_string(),
                "frequency must be a finite, non-negative number",
            ));
        }

        let khz = (mhz * KHZ_PER_MHZ as f64).round();
        if khz > MAX_KHZ as f64 {
            return Err(BridgeError::encoding_rejected(
                mhz.to_string(),
                "frequency does not fit in a 32-bit Hz value",
            ));
        }

        Ok(Self { khz: khz as u32 })
    }

    pub fn khz(&self) -> u32 {
        self.khz
    }

    pub fn hz(&self) -> u32 {
        // from_khz guarantees this fits
        self.khz * HZ_PER_KHZ
    }

    pub fn mhz(&self) -> f64 {
        self.khz as f64 / KHZ_PER_MHZ as f64
    }

    fn whole_mhz(&self) -> u32 {
        self.khz / KHZ_PER_MHZ
    }

    fn fraction_khz(&self) -> u32 {
        self.khz % KHZ_PER_MHZ
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03} MHz", self.whole_mhz(), self.fraction_khz())
    }
}

impl std::str::FromStr for Frequency {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_mhz(s)
    }
}

/// Wire representation expected by a frequency-setting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyEncoding {
    /// Plain Hz integer, for `*_SET_HZ` events
    #[default]
    RawHz,
    /// Packed binary-coded decimal, as the simulated avionics expect
    Bcd16,
}

impl FrequencyEncoding {
    /// Encode a frequency into the 32-bit event payload.
    pub fn encode(&self, frequency: Frequency) -> Result<u32> {
        match self {
            FrequencyEncoding::RawHz => Ok(frequency.hz()),
            FrequencyEncoding::Bcd16 => {
                let whole = frequency.whole_mhz();
                if whole > MAX_BCD_WHOLE {
                    return Err(BridgeError::encoding_rejected(
                        frequency.to_string(),
                        "BCD16 holds at most three whole-MHz digits",
                    ));
                }
                Ok((bcd3(frequency.fraction_khz()) << 16) | bcd3(whole))
            }
        }
    }

    /// Recover the frequency from an encoded payload.
    pub fn decode(&self, word: u32) -> Result<Frequency> {
        match self {
            FrequencyEncoding::RawHz => {
                if word % HZ_PER_KHZ != 0 {
                    return Err(BridgeError::parse_error(
                        "raw Hz payload",
                        format!("{} Hz is not a whole number of kHz", word),
                    ));
                }
                Frequency::from_khz(word / HZ_PER_KHZ)
            }
            FrequencyEncoding::Bcd16 => {
                let whole = unbcd3(word & 0xFFFF)?;
                let fraction = unbcd3(word >> 16)?;
                Frequency::from_khz(whole * KHZ_PER_MHZ + fraction)
            }
        }
    }
}

impl fmt::Display for FrequencyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyEncoding::RawHz => f.write_str("raw Hz"),
            FrequencyEncoding::Bcd16 => f.write_str("BCD16"),
        }
    }
}

/// Pack a value below 1000 into three BCD nibbles.
fn bcd3(value: u32) -> u32 {
    ((value / 100) << 8) | (((value / 10) % 10) << 4) | (value % 10)
}

/// Unpack three BCD nibbles from a half-word; the top nibble must be zero.
fn unbcd3(half: u32) -> Result<u32> {
    if half & 0xF000 != 0 {
        return Err(BridgeError::parse_error(
            "BCD16 payload",
            format!("unused nibble set in {:#06x}", half),
        ));
    }

    let mut value = 0;
    for shift in [8, 4, 0] {
        let digit = (half >> shift) & 0xF;
        if digit > 9 {
            return Err(BridgeError::parse_error(
                "BCD16 payload",
                format!("nibble {:#x} is not a decimal digit", digit),
            ));
        }
        value = value * 10 + digit;
    }
    Ok(value)
}
