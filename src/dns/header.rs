use super::wire::{ParseError, read_u16, write_u16};

/// DNS header return codes (RFC 1035 §4.1.1). Only the subset the core
/// actually produces or inspects is named; anything else round-trips as
/// its raw nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Other(u8),
}

impl ResponseCode {
    pub fn to_u8(self) -> u8 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NameError => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Other(v) => v & 0x0F,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v & 0x0F {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            other => ResponseCode::Other(other),
        }
    }
}

/// The 12-byte DNS message header.
#[derive(Debug, Clone)]
pub struct DnsHeader {
    pub id: u16,
    pub is_query: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub response_code: ResponseCode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsHeader {
    pub fn new_query(id: u16) -> Self {
        Self {
            id,
            is_query: true,
            recursion_desired: true,
            recursion_available: false,
            response_code: ResponseCode::NoError,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// Builds the header for a reply to `self`, copying the id and the
    /// recursion-desired bit as RFC 1035 requires.
    pub fn reply(&self, response_code: ResponseCode) -> Self {
        Self {
            id: self.id,
            is_query: false,
            recursion_desired: self.recursion_desired,
            recursion_available: true,
            response_code,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    pub fn from_wire(buf: &[u8], pos: usize) -> Result<(Self, usize), ParseError> {
        let (id, pos) = read_u16(buf, pos)?;
        let (flags, pos) = read_u16(buf, pos)?;
        let (qdcount, pos) = read_u16(buf, pos)?;
        let (ancount, pos) = read_u16(buf, pos)?;
        let (nscount, pos) = read_u16(buf, pos)?;
        let (arcount, pos) = read_u16(buf, pos)?;

        let is_query = flags & 0x8000 == 0;
        let recursion_desired = flags & 0x0100 != 0;
        let recursion_available = flags & 0x0080 != 0;
        let response_code = ResponseCode::from_u8((flags & 0x000F) as u8);

        Ok((
            Self {
                id,
                is_query,
                recursion_desired,
                recursion_available,
                response_code,
                qdcount,
                ancount,
                nscount,
                arcount,
            },
            pos,
        ))
    }

    pub fn to_wire(&self, out: &mut Vec<u8>) {
        write_u16(out, self.id);
        let mut flags: u16 = 0;
        if !self.is_query {
            flags |= 0x8000;
        }
        if self.recursion_desired {
            flags |= 0x0100;
        }
        if self.recursion_available {
            flags |= 0x0080;
        }
        flags |= self.response_code.to_u8() as u16 & 0x000F;
        write_u16(out, flags);
        write_u16(out, self.qdcount);
        write_u16(out, self.ancount);
        write_u16(out, self.nscount);
        write_u16(out, self.arcount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut h = DnsHeader::new_query(0xabcd);
        h.qdcount = 1;
        let mut buf = Vec::new();
        h.to_wire(&mut buf);
        let (parsed, pos) = DnsHeader::from_wire(&buf, 0).unwrap();
        assert_eq!(pos, 12);
        assert_eq!(parsed.id, 0xabcd);
        assert!(parsed.is_query);
        assert_eq!(parsed.qdcount, 1);
    }

    #[test]
    fn reply_preserves_id_and_rd() {
        let mut q = DnsHeader::new_query(42);
        q.recursion_desired = false;
        let r = q.reply(ResponseCode::Refused);
        assert_eq!(r.id, 42);
        assert!(!r.is_query);
        assert!(!r.recursion_desired);
        assert_eq!(r.response_code, ResponseCode::Refused);
    }
}
