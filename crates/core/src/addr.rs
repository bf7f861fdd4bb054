use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Storage domain of an address prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Bit,
    Word,
    Float,
    Text,
}

/// Address prefix. Each prefix names one contiguous, fixed-size slice of
/// its domain's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prefix {
    X,
    Y,
    C,
    Sc,
    T,
    Ct,
    Xd,
    Yd,
    Xs,
    Ys,
    Ds,
    Dd,
    Dh,
    Sd,
    Td,
    Ctd,
    Df,
    Txt,
}

pub const PREFIXES: [Prefix; 18] = [
    Prefix::X,
    Prefix::Y,
    Prefix::C,
    Prefix::Sc,
    Prefix::T,
    Prefix::Ct,
    Prefix::Xd,
    Prefix::Yd,
    Prefix::Xs,
    Prefix::Ys,
    Prefix::Ds,
    Prefix::Dd,
    Prefix::Dh,
    Prefix::Sd,
    Prefix::Td,
    Prefix::Ctd,
    Prefix::Df,
    Prefix::Txt,
];

impl Prefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Prefix::X => "X",
            Prefix::Y => "Y",
            Prefix::C => "C",
            Prefix::Sc => "SC",
            Prefix::T => "T",
            Prefix::Ct => "CT",
            Prefix::Xd => "XD",
            Prefix::Yd => "YD",
            Prefix::Xs => "XS",
            Prefix::Ys => "YS",
            Prefix::Ds => "DS",
            Prefix::Dd => "DD",
            Prefix::Dh => "DH",
            Prefix::Sd => "SD",
            Prefix::Td => "TD",
            Prefix::Ctd => "CTD",
            Prefix::Df => "DF",
            Prefix::Txt => "TXT",
        }
    }

    pub fn parse(text: &str) -> Option<Prefix> {
        PREFIXES
            .iter()
            .copied()
            .find(|prefix| prefix.as_str().eq_ignore_ascii_case(text))
    }

    pub fn domain(self) -> Domain {
        match self {
            Prefix::X | Prefix::Y | Prefix::C | Prefix::Sc | Prefix::T | Prefix::Ct => Domain::Bit,
            Prefix::Xd
            | Prefix::Yd
            | Prefix::Xs
            | Prefix::Ys
            | Prefix::Ds
            | Prefix::Dd
            | Prefix::Dh
            | Prefix::Sd
            | Prefix::Td
            | Prefix::Ctd => Domain::Word,
            Prefix::Df => Domain::Float,
            Prefix::Txt => Domain::Text,
        }
    }

    /// Highest valid index for this prefix. Indexing is 1-based.
    pub fn capacity(self) -> u16 {
        match self {
            Prefix::X | Prefix::Y | Prefix::C | Prefix::Dd | Prefix::Dh | Prefix::Df => 2000,
            Prefix::Sc | Prefix::Sd => 1000,
            Prefix::T | Prefix::Td => 500,
            Prefix::Ct | Prefix::Ctd => 250,
            Prefix::Xd | Prefix::Yd | Prefix::Xs | Prefix::Ys => 125,
            Prefix::Ds | Prefix::Txt => 10000,
        }
    }

    /// Base offset of this prefix's slice inside its domain buffer.
    pub(crate) fn base(self) -> usize {
        match self {
            // bit domain
            Prefix::X => 0,
            Prefix::Y => 2000,
            Prefix::C => 4000,
            Prefix::Sc => 6000,
            Prefix::T => 7000,
            Prefix::Ct => 7500,
            // word domain
            Prefix::Xd => 0,
            Prefix::Yd => 125,
            Prefix::Xs => 250,
            Prefix::Ys => 375,
            Prefix::Ds => 500,
            Prefix::Dd => 10500,
            Prefix::Dh => 12500,
            Prefix::Sd => 14500,
            Prefix::Td => 15500,
            Prefix::Ctd => 16000,
            // float domain
            Prefix::Df => 0,
            // text domain
            Prefix::Txt => 0,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddrError {
    #[error("malformed address '{token}'")]
    Malformed { token: String },
    #[error("unknown address prefix '{prefix}'")]
    UnknownPrefix { prefix: String },
    #[error("address {prefix}{index} is out of range (valid {prefix}1..{prefix}{max})")]
    OutOfRange {
        prefix: &'static str,
        index: u32,
        max: u16,
    },
}

/// A validated address. Construction checks the index range, so a value of
/// this type always denotes a real data-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    prefix: Prefix,
    index: u16,
}

impl Address {
    pub fn new(prefix: Prefix, index: u32) -> Result<Self, AddrError> {
        if index == 0 || index > u32::from(prefix.capacity()) {
            return Err(AddrError::OutOfRange {
                prefix: prefix.as_str(),
                index,
                max: prefix.capacity(),
            });
        }
        Ok(Self {
            prefix,
            index: index as u16,
        })
    }

    pub fn prefix(self) -> Prefix {
        self.prefix
    }

    pub fn index(self) -> u16 {
        self.index
    }

    pub fn domain(self) -> Domain {
        self.prefix.domain()
    }

    /// The address `delta` slots further along the same prefix.
    pub fn offset(self, delta: i64) -> Result<Self, AddrError> {
        let index = i64::from(self.index) + delta;
        let index = u32::try_from(index).map_err(|_| AddrError::OutOfRange {
            prefix: self.prefix.as_str(),
            index: 0,
            max: self.prefix.capacity(),
        })?;
        Self::new(self.prefix, index)
    }

    /// The word address shadowing a timer or counter bit: `T7` -> `TD7`,
    /// `CT7` -> `CTD7`.
    pub fn word_shadow(self) -> Option<Self> {
        let prefix = match self.prefix {
            Prefix::T => Prefix::Td,
            Prefix::Ct => Prefix::Ctd,
            _ => return None,
        };
        Some(Self {
            prefix,
            index: self.index,
        })
    }

    pub(crate) fn slot(self) -> usize {
        self.prefix.base() + usize::from(self.index) - 1
    }
}

impl FromStr for Address {
    type Err = AddrError;

    fn from_str(token: &str) -> Result<Self, AddrError> {
        let split = token
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map(|(at, _)| at)
            .unwrap_or(token.len());
        let (head, tail) = token.split_at(split);
        if head.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AddrError::Malformed {
                token: token.to_string(),
            });
        }
        let prefix = Prefix::parse(head).ok_or_else(|| AddrError::UnknownPrefix {
            prefix: head.to_string(),
        })?;
        let index = tail.parse::<u32>().map_err(|_| AddrError::Malformed {
            token: token.to_string(),
        })?;
        Self::new(prefix, index)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_prefix() {
        for prefix in PREFIXES {
            let text = format!("{}1", prefix.as_str());
            let addr: Address = text.parse().expect("parse");
            assert_eq!(addr.prefix(), prefix);
            assert_eq!(addr.index(), 1);
        }
    }

    #[test]
    fn prefix_is_the_whole_alphabetic_run() {
        let addr: Address = "CT12".parse().expect("parse");
        assert_eq!(addr.prefix(), Prefix::Ct);
        let addr: Address = "CTD12".parse().expect("parse");
        assert_eq!(addr.prefix(), Prefix::Ctd);
        let addr: Address = "TXT9".parse().expect("parse");
        assert_eq!(addr.prefix(), Prefix::Txt);
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert!("X0".parse::<Address>().is_err());
        assert!("X2000".parse::<Address>().is_ok());
        assert!("X2001".parse::<Address>().is_err());
        assert!("CT251".parse::<Address>().is_err());
        assert!("DS10000".parse::<Address>().is_ok());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!("X".parse::<Address>().is_err());
        assert!("17".parse::<Address>().is_err());
        assert!("X1Y".parse::<Address>().is_err());
        assert!("Q7".parse::<Address>().is_err());
    }

    #[test]
    fn timer_and_counter_bits_have_word_shadows() {
        let t: Address = "T12".parse().expect("parse");
        assert_eq!(t.word_shadow().expect("shadow").to_string(), "TD12");
        let ct: Address = "CT9".parse().expect("parse");
        assert_eq!(ct.word_shadow().expect("shadow").to_string(), "CTD9");
        let x: Address = "X1".parse().expect("parse");
        assert!(x.word_shadow().is_none());
    }

    #[test]
    fn domain_slices_do_not_overlap() {
        let mut by_domain: std::collections::HashMap<Domain, Vec<(usize, usize)>> =
            std::collections::HashMap::new();
        for prefix in PREFIXES {
            by_domain
                .entry(prefix.domain())
                .or_default()
                .push((prefix.base(), prefix.base() + usize::from(prefix.capacity())));
        }
        for slices in by_domain.values_mut() {
            slices.sort();
            for pair in slices.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "overlapping slices {pair:?}");
            }
        }
    }
}
