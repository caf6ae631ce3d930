use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::question::{RecordClass, RecordType};
use super::wire::{
    ParseError, read_name, read_u16, read_u32, write_name_compressed, write_name_plain, write_u16,
    write_u32,
};

/// Record data. `Other` preserves any type the core has no specific business
/// logic for (opaque bytes) so replies round-trip without loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Ns(String),
    Ptr(String),
    Mx { preference: u16, exchange: String },
    Txt(Vec<String>),
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Other { rtype: u16, data: Vec<u8> },
}

/// One resource record. Used for the answer, authority and additional
/// sections alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new_a(name: impl Into<String>, addr: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            rclass: RecordClass::In,
            ttl,
            rdata: RData::A(addr),
        }
    }

    pub fn new_aaaa(name: impl Into<String>, addr: Ipv6Addr, ttl: u32) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            rclass: RecordClass::In,
            ttl,
            rdata: RData::Aaaa(addr),
        }
    }

    pub fn rtype(&self) -> RecordType {
        match &self.rdata {
            RData::A(_) => RecordType::A,
            RData::Aaaa(_) => RecordType::Aaaa,
            RData::Cname(_) => RecordType::Cname,
            RData::Ns(_) => RecordType::Ns,
            RData::Ptr(_) => RecordType::Ptr,
            RData::Mx { .. } => RecordType::Mx,
            RData::Txt(_) => RecordType::Txt,
            RData::Soa { .. } => RecordType::Soa,
            RData::Srv { .. } => RecordType::Srv,
            RData::Other { rtype, .. } => RecordType::from_u16(*rtype),
        }
    }

    pub fn from_wire(buf: &[u8], pos: usize) -> Result<(Self, usize), ParseError> {
        let (name, pos) = read_name(buf, pos)?;
        let (rtype, pos) = read_u16(buf, pos)?;
        let (rclass, pos) = read_u16(buf, pos)?;
        let (ttl, pos) = read_u32(buf, pos)?;
        let (rdlength, pos) = read_u16(buf, pos)?;
        let rdata_start = pos;
        let rdata_end = rdata_start + rdlength as usize;
        if rdata_end > buf.len() {
            return Err(ParseError::Truncated("rdata"));
        }

        let rdata = match RecordType::from_u16(rtype) {
            RecordType::A => {
                let bytes = &buf[rdata_start..rdata_end];
                if bytes.len() != 4 {
                    return Err(ParseError::InvalidLabel);
                }
                RData::A(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            RecordType::Aaaa => {
                let bytes = &buf[rdata_start..rdata_end];
                if bytes.len() != 16 {
                    return Err(ParseError::InvalidLabel);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                RData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::Cname => RData::Cname(read_name(buf, rdata_start)?.0),
            RecordType::Ns => RData::Ns(read_name(buf, rdata_start)?.0),
            RecordType::Ptr => RData::Ptr(read_name(buf, rdata_start)?.0),
            RecordType::Mx => {
                let (preference, p) = read_u16(buf, rdata_start)?;
                let (exchange, _) = read_name(buf, p)?;
                RData::Mx {
                    preference,
                    exchange,
                }
            }
            RecordType::Txt => {
                let mut strings = Vec::new();
                let mut p = rdata_start;
                while p < rdata_end {
                    let len = *buf.get(p).ok_or(ParseError::Truncated("txt"))? as usize;
                    let end = p + 1 + len;
                    if end > rdata_end {
                        return Err(ParseError::Truncated("txt"));
                    }
                    let s = String::from_utf8_lossy(&buf[p + 1..end]).into_owned();
                    strings.push(s);
                    p = end;
                }
                RData::Txt(strings)
            }
            RecordType::Soa => {
                let (mname, p) = read_name(buf, rdata_start)?;
                let (rname, p) = read_name(buf, p)?;
                let (serial, p) = read_u32(buf, p)?;
                let (refresh, p) = read_u32(buf, p)?;
                let (retry, p) = read_u32(buf, p)?;
                let (expire, p) = read_u32(buf, p)?;
                let (minimum, _) = read_u32(buf, p)?;
                RData::Soa {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                }
            }
            RecordType::Srv => {
                let (priority, p) = read_u16(buf, rdata_start)?;
                let (weight, p) = read_u16(buf, p)?;
                let (port, p) = read_u16(buf, p)?;
                let (target, _) = read_name(buf, p)?;
                RData::Srv {
                    priority,
                    weight,
                    port,
                    target,
                }
            }
            RecordType::Other(t) => RData::Other {
                rtype: t,
                data: buf[rdata_start..rdata_end].to_vec(),
            },
        };

        Ok((
            ResourceRecord {
                name,
                rclass: RecordClass::from_u16(rclass),
                ttl,
                rdata,
            },
            rdata_end,
        ))
    }

    pub fn to_wire(&self, out: &mut Vec<u8>, offsets: &mut HashMap<String, u16>) {
        write_name_compressed(out, &self.name, offsets);
        write_u16(out, self.rtype().to_u16());
        write_u16(out, self.rclass.to_u16());
        write_u32(out, self.ttl);

        let len_pos = out.len();
        write_u16(out, 0); // placeholder, patched below
        let rdata_start = out.len();

        match &self.rdata {
            RData::A(addr) => out.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => out.extend_from_slice(&addr.octets()),
            RData::Cname(n) | RData::Ns(n) | RData::Ptr(n) => write_name_plain(out, n),
            RData::Mx {
                preference,
                exchange,
            } => {
                write_u16(out, *preference);
                write_name_plain(out, exchange);
            }
            RData::Txt(parts) => {
                for part in parts {
                    out.push(part.len() as u8);
                    out.extend_from_slice(part.as_bytes());
                }
            }
            RData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                write_name_plain(out, mname);
                write_name_plain(out, rname);
                write_u32(out, *serial);
                write_u32(out, *refresh);
                write_u32(out, *retry);
                write_u32(out, *expire);
                write_u32(out, *minimum);
            }
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                write_u16(out, *priority);
                write_u16(out, *weight);
                write_u16(out, *port);
                write_name_plain(out, target);
            }
            RData::Other { data, .. } => out.extend_from_slice(data),
        }

        let rdlength = (out.len() - rdata_start) as u16;
        out[len_pos..len_pos + 2].copy_from_slice(&rdlength.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_record_round_trips() {
        let rr = ResourceRecord::new_a("example.com", Ipv4Addr::new(1, 2, 3, 4), 300);
        let mut buf = Vec::new();
        rr.to_wire(&mut buf, &mut HashMap::new());
        let (parsed, pos) = ResourceRecord::from_wire(&buf, 0).unwrap();
        assert_eq!(pos, buf.len());
        assert_eq!(parsed, rr);
    }

    #[test]
    fn unknown_rtype_preserves_opaque_rdata() {
        let rr = ResourceRecord {
            name: "example.com".into(),
            rclass: RecordClass::In,
            ttl: 10,
            rdata: RData::Other {
                rtype: 999,
                data: vec![1, 2, 3],
            },
        };
        let mut buf = Vec::new();
        rr.to_wire(&mut buf, &mut HashMap::new());
        let (parsed, _) = ResourceRecord::from_wire(&buf, 0).unwrap();
        assert_eq!(parsed.rdata, rr.rdata);
    }
}
