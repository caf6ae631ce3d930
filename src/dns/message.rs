use std::collections::HashMap;

use super::header::{DnsHeader, ResponseCode};
use super::question::{Question, RecordClass, RecordType};
use super::resource::ResourceRecord;
use super::wire::{ParseError, apply_mutation_trailer, write_name_mutated_head};

/// An opaque TSIG record, passed through unexamined. Present only when the
/// inbound message carried one in its additional section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsigOpaque {
    pub name: String,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

const TSIG_RTYPE: u16 = 250;

/// A fully decoded DNS message.
#[derive(Debug, Clone)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
    pub tsig: Option<TsigOpaque>,
}

impl DnsMessage {
    pub fn new_query(id: u16, question: Question) -> Self {
        let mut header = DnsHeader::new_query(id);
        header.qdcount = 1;
        Self {
            header,
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            tsig: None,
        }
    }

    /// Builds an empty reply to this message with the given response code,
    /// copying the transaction id and the original question.
    pub fn reply(&self, response_code: ResponseCode) -> Self {
        let mut header = self.header.reply(response_code);
        header.qdcount = self.questions.len() as u16;
        Self {
            header,
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            tsig: self.tsig.clone(),
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let (header, mut pos) = DnsHeader::from_wire(buf, 0)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (q, next) = Question::from_wire(buf, pos)?;
            questions.push(q);
            pos = next;
        }
        if questions.is_empty() {
            return Err(ParseError::NoQuestions);
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let (rr, next) = ResourceRecord::from_wire(buf, pos)?;
            answers.push(rr);
            pos = next;
        }

        let mut authority = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            let (rr, next) = ResourceRecord::from_wire(buf, pos)?;
            authority.push(rr);
            pos = next;
        }

        let mut additional = Vec::with_capacity(header.arcount as usize);
        let mut tsig = None;
        for _ in 0..header.arcount {
            let (rr, next) = ResourceRecord::from_wire(buf, pos)?;
            pos = next;
            if rr.rtype().to_u16() == TSIG_RTYPE {
                tsig = Some(TsigOpaque {
                    name: rr.name.clone(),
                    rclass: rr.rclass,
                    ttl: rr.ttl,
                    rdata: match &rr.rdata {
                        super::resource::RData::Other { data, .. } => data.clone(),
                        _ => Vec::new(),
                    },
                });
            }
            additional.push(rr);
        }

        Ok(DnsMessage {
            header,
            questions,
            answers,
            authority,
            additional,
            tsig,
        })
    }

    fn counts_synced(&self) -> DnsHeader {
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authority.len() as u16;
        header.arcount = self.additional.len() as u16;
        header
    }

    /// Standard encoding with name compression across all sections.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_inner(false)
    }

    /// Compression-pointer-mutated encoding of the (single) question, used
    /// only for outbound queries on the forwarder socket.
    pub fn encode_mutated(&self) -> Vec<u8> {
        self.encode_inner(true)
    }

    fn encode_inner(&self, mutate: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        self.counts_synced().to_wire(&mut out);

        let mut offsets: HashMap<String, u16> = HashMap::new();
        let mut pending_patch = None;

        if mutate && self.header.is_query && self.questions.len() == 1 {
            let q = &self.questions[0];
            if let Some(patch) = write_name_mutated_head(&mut out, &q.name) {
                super::wire::write_u16(&mut out, q.qtype.to_u16());
                super::wire::write_u16(&mut out, q.qclass.to_u16());
                pending_patch = Some(patch);
            } else {
                q.to_wire(&mut out, &mut offsets);
            }
        } else {
            for q in &self.questions {
                q.to_wire(&mut out, &mut offsets);
            }
        }

        for rr in self
            .answers
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
        {
            rr.to_wire(&mut out, &mut offsets);
        }

        if let Some(patch) = pending_patch {
            apply_mutation_trailer(&mut out, patch);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_query() -> DnsMessage {
        DnsMessage::new_query(
            0x1234,
            Question::new("example.com", RecordType::A, RecordClass::In),
        )
    }

    #[test]
    fn plain_round_trip() {
        let msg = sample_query();
        let bytes = msg.encode();
        let parsed = DnsMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.header.id, 0x1234);
        assert_eq!(parsed.questions[0].name, "example.com");
    }

    #[test]
    fn reply_with_answer_round_trips() {
        let query = sample_query();
        let mut reply = query.reply(ResponseCode::NoError);
        reply
            .answers
            .push(ResourceRecord::new_a("example.com", Ipv4Addr::new(9, 9, 9, 9), 600));
        let bytes = reply.encode();
        let parsed = DnsMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.header.id, query.header.id);
        assert_eq!(parsed.answers.len(), 1);
        assert_eq!(parsed.answers[0].rdata, reply.answers[0].rdata);
    }

    #[test]
    fn mutated_query_round_trips() {
        let msg = DnsMessage::new_query(
            7,
            Question::new("foo.example.com", RecordType::A, RecordClass::In),
        );
        let bytes = msg.encode_mutated();
        let parsed = DnsMessage::parse(&bytes).unwrap();
        assert_eq!(parsed.questions[0].name, "foo.example.com");
    }

    #[test]
    fn zero_questions_is_a_parse_error() {
        let mut header_bytes = Vec::new();
        DnsHeader::new_query(1).to_wire(&mut header_bytes);
        assert_eq!(
            DnsMessage::parse(&header_bytes).unwrap_err(),
            ParseError::NoQuestions
        );
    }
}
