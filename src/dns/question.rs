use std::collections::HashMap;

use super::wire::{ParseError, read_name, read_u16, write_name_compressed, write_u16};

/// QTYPE. `Other` preserves any record type the core doesn't special-case so
/// replies round-trip without flattening them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Other(u16),
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Other(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            12 => RecordType::Ptr,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            other => RecordType::Other(other),
        }
    }

    pub fn is_a_or_aaaa(self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

/// QCLASS. `Other` preserves anything beyond the usual internet class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    In,
    Other(u16),
}

impl RecordClass {
    pub fn to_u16(self) -> u16 {
        match self {
            RecordClass::In => 1,
            RecordClass::Other(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => RecordClass::In,
            other => RecordClass::Other(other),
        }
    }
}

/// A single entry of the question section. Names are stored canonically
/// lowercased and compared case-insensitively throughout the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            qtype,
            qclass,
        }
    }

    pub fn from_wire(buf: &[u8], pos: usize) -> Result<(Self, usize), ParseError> {
        let (name, pos) = read_name(buf, pos)?;
        let (qtype, pos) = read_u16(buf, pos)?;
        let (qclass, pos) = read_u16(buf, pos)?;
        Ok((
            Question {
                name,
                qtype: RecordType::from_u16(qtype),
                qclass: RecordClass::from_u16(qclass),
            },
            pos,
        ))
    }

    pub fn to_wire(&self, out: &mut Vec<u8>, offsets: &mut HashMap<String, u16>) {
        write_name_compressed(out, &self.name, offsets);
        write_u16(out, self.qtype.to_u16());
        write_u16(out, self.qclass.to_u16());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_round_trips() {
        let q = Question::new("Example.COM", RecordType::A, RecordClass::In);
        assert_eq!(q.name, "example.com");

        let mut buf = Vec::new();
        let mut offsets = HashMap::new();
        q.to_wire(&mut buf, &mut offsets);
        let (parsed, pos) = Question::from_wire(&buf, 0).unwrap();
        assert_eq!(pos, buf.len());
        assert_eq!(parsed, q);
    }

    #[test]
    fn unknown_qtype_round_trips_as_other() {
        let q = Question::new("example.com", RecordType::Other(65), RecordClass::In);
        let mut buf = Vec::new();
        q.to_wire(&mut buf, &mut HashMap::new());
        let (parsed, _) = Question::from_wire(&buf, 0).unwrap();
        assert_eq!(parsed.qtype, RecordType::Other(65));
    }
}
