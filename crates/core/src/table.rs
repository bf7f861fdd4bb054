use ilc_eval::Number;
use serde::Serialize;
use thiserror::Error;

use crate::addr::{Address, AddrError, Domain, PREFIXES};

/// Longest string a TXT slot will hold; writes are truncated on a char
/// boundary.
pub const TEXT_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bit(bool),
    Word(i32),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn zero(domain: Domain) -> Value {
        match domain {
            Domain::Bit => Value::Bit(false),
            Domain::Word => Value::Word(0),
            Domain::Float => Value::Float(0.0),
            Domain::Text => Value::Text(String::new()),
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Value::Bit(_) => Domain::Bit,
            Value::Word(_) => Domain::Word,
            Value::Float(_) => Domain::Float,
            Value::Text(_) => Domain::Text,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error(transparent)]
    Addr(#[from] AddrError),
}

fn domain_len(domain: Domain) -> usize {
    PREFIXES
        .iter()
        .filter(|prefix| prefix.domain() == domain)
        .map(|prefix| usize::from(prefix.capacity()))
        .sum()
}

/// The PLC address space: one contiguous buffer per domain, carved into
/// per-prefix slices. Access is O(1) array indexing; a validated `Address`
/// always lands inside its slice.
#[derive(Debug, Clone)]
pub struct DataTable {
    bits: Vec<bool>,
    words: Vec<i32>,
    floats: Vec<f64>,
    texts: Vec<String>,
}

impl Default for DataTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTable {
    pub fn new() -> Self {
        Self {
            bits: vec![false; domain_len(Domain::Bit)],
            words: vec![0; domain_len(Domain::Word)],
            floats: vec![0.0; domain_len(Domain::Float)],
            texts: vec![String::new(); domain_len(Domain::Text)],
        }
    }

    // Typed accessors. A domain mismatch reads as the domain zero and
    // writes as a no-op; compiled code has been validated statically and
    // must never fault here.

    pub fn bit(&self, addr: Address) -> bool {
        match addr.domain() {
            Domain::Bit => self.bits[addr.slot()],
            _ => false,
        }
    }

    pub fn set_bit(&mut self, addr: Address, value: bool) {
        if addr.domain() == Domain::Bit {
            self.bits[addr.slot()] = value;
        }
    }

    pub fn word(&self, addr: Address) -> i32 {
        match addr.domain() {
            Domain::Word => self.words[addr.slot()],
            _ => 0,
        }
    }

    pub fn set_word(&mut self, addr: Address, value: i32) {
        if addr.domain() == Domain::Word {
            self.words[addr.slot()] = value;
        }
    }

    pub fn float(&self, addr: Address) -> f64 {
        match addr.domain() {
            Domain::Float => self.floats[addr.slot()],
            _ => 0.0,
        }
    }

    pub fn set_float(&mut self, addr: Address, value: f64) {
        if addr.domain() == Domain::Float {
            self.floats[addr.slot()] = value;
        }
    }

    pub fn text(&self, addr: Address) -> &str {
        match addr.domain() {
            Domain::Text => &self.texts[addr.slot()],
            _ => "",
        }
    }

    pub fn set_text(&mut self, addr: Address, value: &str) {
        if addr.domain() == Domain::Text {
            let mut owned = value.to_string();
            if owned.len() > TEXT_MAX_LEN {
                let cut = (0..=TEXT_MAX_LEN)
                    .rev()
                    .find(|at| owned.is_char_boundary(*at))
                    .unwrap_or(0);
                owned.truncate(cut);
            }
            self.texts[addr.slot()] = owned;
        }
    }

    /// Domain-dispatched read.
    pub fn value(&self, addr: Address) -> Value {
        match addr.domain() {
            Domain::Bit => Value::Bit(self.bit(addr)),
            Domain::Word => Value::Word(self.word(addr)),
            Domain::Float => Value::Float(self.float(addr)),
            Domain::Text => Value::Text(self.text(addr).to_string()),
        }
    }

    /// Domain-dispatched write with cross-domain coercion: numbers convert
    /// between each other, numbers format into text, and text parses into
    /// a number where it can (zero otherwise).
    pub fn set_value(&mut self, addr: Address, value: &Value) {
        match (addr.domain(), value) {
            (Domain::Bit, Value::Bit(v)) => self.set_bit(addr, *v),
            (Domain::Bit, Value::Word(v)) => self.set_bit(addr, *v != 0),
            (Domain::Bit, Value::Float(v)) => self.set_bit(addr, *v != 0.0),
            (Domain::Bit, Value::Text(v)) => self.set_bit(addr, !v.is_empty()),
            (Domain::Word, Value::Bit(v)) => self.set_word(addr, i32::from(*v)),
            (Domain::Word, Value::Word(v)) => self.set_word(addr, *v),
            (Domain::Word, Value::Float(v)) => self.set_word(addr, trunc_i32(*v)),
            (Domain::Word, Value::Text(v)) => {
                self.set_word(addr, v.trim().parse::<i32>().unwrap_or(0))
            }
            (Domain::Float, Value::Bit(v)) => self.set_float(addr, f64::from(u8::from(*v))),
            (Domain::Float, Value::Word(v)) => self.set_float(addr, f64::from(*v)),
            (Domain::Float, Value::Float(v)) => self.set_float(addr, *v),
            (Domain::Float, Value::Text(v)) => {
                self.set_float(addr, v.trim().parse::<f64>().unwrap_or(0.0))
            }
            (Domain::Text, Value::Bit(v)) => {
                let text = if *v { "1" } else { "0" };
                self.set_text(addr, text)
            }
            (Domain::Text, Value::Word(v)) => self.set_text(addr, &v.to_string()),
            (Domain::Text, Value::Float(v)) => self.set_text(addr, &v.to_string()),
            (Domain::Text, Value::Text(v)) => self.set_text(addr, v),
        }
    }

    /// Numeric view of an address for comparisons and math. Bits read as
    /// 0/1; text has no numeric view.
    pub fn number(&self, addr: Address) -> Option<Number> {
        match addr.domain() {
            Domain::Bit => Some(Number::Int(i64::from(self.bit(addr)))),
            Domain::Word => Some(Number::Int(i64::from(self.word(addr)))),
            Domain::Float => Some(Number::Float(self.float(addr))),
            Domain::Text => None,
        }
    }

    // Checked, string-keyed API for hosts poking at the table from outside
    // compiled code.

    pub fn get(&self, addr: &str) -> Result<Value, TableError> {
        let addr: Address = addr.parse()?;
        Ok(self.value(addr))
    }

    pub fn set(&mut self, addr: &str, value: Value) -> Result<(), TableError> {
        let addr: Address = addr.parse()?;
        self.set_value(addr, &value);
        Ok(())
    }

    /// Consistent read-only copy of the whole table.
    pub fn snapshot(&self) -> DataSnapshot {
        DataSnapshot {
            bits: self.bits.clone(),
            words: self.words.clone(),
            floats: self.floats.clone(),
            texts: self.texts.clone(),
        }
    }
}

impl ilc_eval::Resolve for DataTable {
    fn resolve(&self, ident: &str) -> Option<Number> {
        let addr: Address = ident.parse().ok()?;
        self.number(addr)
    }
}

fn trunc_i32(value: f64) -> i32 {
    if value.is_nan() {
        0
    } else {
        value.trunc().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
    }
}

/// Point-in-time copy of the data table, cheap to hand to observers on
/// other threads.
#[derive(Debug, Clone, Serialize)]
pub struct DataSnapshot {
    bits: Vec<bool>,
    words: Vec<i32>,
    floats: Vec<f64>,
    texts: Vec<String>,
}

impl DataSnapshot {
    pub fn value(&self, addr: Address) -> Value {
        match addr.domain() {
            Domain::Bit => Value::Bit(self.bits[addr.slot()]),
            Domain::Word => Value::Word(self.words[addr.slot()]),
            Domain::Float => Value::Float(self.floats[addr.slot()]),
            Domain::Text => Value::Text(self.texts[addr.slot()].clone()),
        }
    }

    pub fn get(&self, addr: &str) -> Result<Value, TableError> {
        let addr: Address = addr.parse()?;
        Ok(self.value(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> Address {
        text.parse().expect("address")
    }

    #[test]
    fn reads_before_write_return_domain_zero() {
        let table = DataTable::new();
        assert!(!table.bit(addr("X1")));
        assert_eq!(table.word(addr("DS10000")), 0);
        assert_eq!(table.float(addr("DF2000")), 0.0);
        assert_eq!(table.text(addr("TXT1")), "");
    }

    #[test]
    fn set_then_get_round_trips_every_domain() {
        let mut table = DataTable::new();
        table.set_bit(addr("C7"), true);
        table.set_word(addr("DS42"), -1234);
        table.set_float(addr("DF3"), 2.5);
        table.set_text(addr("TXT5"), "hello");
        assert!(table.bit(addr("C7")));
        assert_eq!(table.word(addr("DS42")), -1234);
        assert_eq!(table.float(addr("DF3")), 2.5);
        assert_eq!(table.text(addr("TXT5")), "hello");
    }

    #[test]
    fn neighbouring_prefixes_do_not_alias() {
        let mut table = DataTable::new();
        table.set_bit(addr("X2000"), true);
        assert!(!table.bit(addr("Y1")));
        table.set_word(addr("YS125"), 9);
        assert_eq!(table.word(addr("DS1")), 0);
    }

    #[test]
    fn checked_api_rejects_invalid_addresses() {
        let mut table = DataTable::new();
        assert!(table.get("X2001").is_err());
        assert!(table.set("QQ1", Value::Bit(true)).is_err());
        assert!(table.get("DS1").is_ok());
    }

    #[test]
    fn set_value_coerces_across_domains() {
        let mut table = DataTable::new();
        table.set_value(addr("DS1"), &Value::Float(7.9));
        assert_eq!(table.word(addr("DS1")), 7);
        table.set_value(addr("DF1"), &Value::Word(3));
        assert_eq!(table.float(addr("DF1")), 3.0);
        table.set_value(addr("TXT1"), &Value::Word(12));
        assert_eq!(table.text(addr("TXT1")), "12");
        table.set_value(addr("DS2"), &Value::Text("  44 ".to_string()));
        assert_eq!(table.word(addr("DS2")), 44);
        table.set_value(addr("DS3"), &Value::Text("nope".to_string()));
        assert_eq!(table.word(addr("DS3")), 0);
    }

    #[test]
    fn text_writes_are_bounded() {
        let mut table = DataTable::new();
        let long = "x".repeat(TEXT_MAX_LEN + 50);
        table.set_text(addr("TXT1"), &long);
        assert_eq!(table.text(addr("TXT1")).len(), TEXT_MAX_LEN);
    }

    #[test]
    fn snapshot_is_decoupled_from_later_writes() {
        let mut table = DataTable::new();
        table.set_word(addr("DS1"), 5);
        let snap = table.snapshot();
        table.set_word(addr("DS1"), 6);
        assert_eq!(snap.value(addr("DS1")), Value::Word(5));
        assert_eq!(table.word(addr("DS1")), 6);
    }
}
