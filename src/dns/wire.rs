//! Low-level byte-on-the-wire helpers shared by the rest of `dns`: domain
//! name compression/decompression and the primitive integer readers/writers
//! that `header`, `question`, `resource` and `message` build on.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Largest offset a compression pointer can address (14 bits).
const MAX_POINTER_OFFSET: usize = 0x3FFF;
/// Bounds the number of pointer hops a single name may take before we
/// conclude the buffer is looped.
const MAX_POINTER_JUMPS: u8 = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("buffer truncated while reading {0}")]
    Truncated(&'static str),
    #[error("label length exceeds 63 bytes or contains invalid utf-8")]
    InvalidLabel,
    #[error("compression pointer forms a loop")]
    PointerLoop,
    #[error("message carries zero questions")]
    NoQuestions,
}

pub fn read_u16(buf: &[u8], pos: usize) -> Result<(u16, usize), ParseError> {
    if pos + 2 > buf.len() {
        return Err(ParseError::Truncated("u16"));
    }
    Ok((u16::from_be_bytes([buf[pos], buf[pos + 1]]), pos + 2))
}

pub fn read_u32(buf: &[u8], pos: usize) -> Result<(u32, usize), ParseError> {
    if pos + 4 > buf.len() {
        return Err(ParseError::Truncated("u32"));
    }
    Ok((
        u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]),
        pos + 4,
    ))
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn split_labels(name: &str) -> Vec<&str> {
    if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').filter(|l| !l.is_empty()).collect()
    }
}

/// Reads a (possibly compressed) domain name starting at `pos` within the
/// full packet buffer. Returns the lowercased dotted name and the position
/// immediately following the name as seen by the *caller* (pointer jumps are
/// followed internally but never change where the caller resumes reading).
pub fn read_name(buf: &[u8], start: usize) -> Result<(String, usize), ParseError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut caller_next: Option<usize> = None;
    let mut jumps = 0u8;
    // Pointers may legitimately jump forward (e.g. into a trailer appended
    // past the rest of the message), so looping is detected by revisiting a
    // target rather than by requiring strictly-decreasing offsets.
    let mut visited_pointers: HashSet<usize> = HashSet::new();

    loop {
        let len = *buf.get(pos).ok_or(ParseError::Truncated("name"))?;

        if len == 0 {
            if caller_next.is_none() {
                caller_next = Some(pos + 1);
            }
            break;
        }

        if len & 0xC0 == 0xC0 {
            let b2 = *buf.get(pos + 1).ok_or(ParseError::Truncated("name"))?;
            let pointer = (((len & 0x3F) as usize) << 8) | b2 as usize;
            if caller_next.is_none() {
                caller_next = Some(pos + 2);
            }
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS || !visited_pointers.insert(pointer) {
                return Err(ParseError::PointerLoop);
            }
            pos = pointer;
            continue;
        }

        if len > 63 {
            return Err(ParseError::InvalidLabel);
        }
        let lstart = pos + 1;
        let lend = lstart + len as usize;
        let bytes = buf.get(lstart..lend).ok_or(ParseError::Truncated("name"))?;
        let label = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label.to_ascii_lowercase());
        pos = lend;
    }

    Ok((labels.join("."), caller_next.unwrap()))
}

/// Writes `name` without any compression (used for the HTTP resolver path
/// and anywhere compression would be pointless, e.g. a one-question buffer).
pub fn write_name_plain(out: &mut Vec<u8>, name: &str) {
    for label in split_labels(name) {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

/// Writes `name`, reusing any previously-written suffix recorded in
/// `offsets` as a compression pointer. Records the offset of every suffix it
/// writes literally so later names can point back into this one.
pub fn write_name_compressed(out: &mut Vec<u8>, name: &str, offsets: &mut HashMap<String, u16>) {
    let labels = split_labels(name);

    for i in 0..labels.len() {
        let suffix = labels[i..].join(".");
        if let Some(&ptr) = offsets.get(&suffix) {
            write_u16(out, 0xC000 | ptr);
            return;
        }
        if out.len() <= MAX_POINTER_OFFSET {
            offsets.insert(suffix, out.len() as u16);
        }
        let label = labels[i];
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

/// Result of writing a mutated question name: the byte range of the pointer
/// placeholder that must be patched once the trailer's offset is known.
pub struct MutationPatch {
    pub pointer_pos: usize,
    pub labels: Vec<String>,
}

/// Writes the first label of `name` literally and reserves a two-byte
/// pointer placeholder for the remaining labels. The caller must finish the
/// mutation by calling [`apply_mutation_trailer`] once the rest of the
/// message has been written.
pub fn write_name_mutated_head(out: &mut Vec<u8>, name: &str) -> Option<MutationPatch> {
    let labels = split_labels(name);
    if labels.len() < 2 {
        return None;
    }
    out.push(labels[0].len() as u8);
    out.extend_from_slice(labels[0].as_bytes());
    let pointer_pos = out.len();
    out.push(0);
    out.push(0);
    Some(MutationPatch {
        pointer_pos,
        labels: labels.into_iter().map(str::to_owned).collect(),
    })
}

/// Appends a full, uncompressed copy of the mutated name past the end of the
/// declared message (a "trailer" naive parsers never reach because they stop
/// at the header's record counts) and patches the earlier pointer placeholder
/// to re-enter this trailer just past its first label.
pub fn apply_mutation_trailer(out: &mut Vec<u8>, patch: MutationPatch) {
    let trailer_start = out.len();
    for label in &patch.labels {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);

    let remaining_offset = trailer_start + patch.labels[0].len() + 1;
    let pointer = 0xC000u16 | (remaining_offset as u16 & MAX_POINTER_OFFSET as u16);
    out[patch.pointer_pos] = (pointer >> 8) as u8;
    out[patch.pointer_pos + 1] = (pointer & 0xFF) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_round_trips() {
        let mut buf = Vec::new();
        write_name_plain(&mut buf, "example.com");
        let (name, next) = read_name(&buf, 0).unwrap();
        assert_eq!(name, "example.com");
        assert_eq!(next, buf.len());
    }

    #[test]
    fn compressed_suffix_is_reused() {
        let mut offsets = HashMap::new();
        let mut buf = Vec::new();
        write_name_compressed(&mut buf, "example.com", &mut offsets);
        let first_len = buf.len();
        write_name_compressed(&mut buf, "www.example.com", &mut offsets);
        // second name must end in a 2-byte pointer, not a full re-encoding
        assert_eq!(buf.len(), first_len + "www".len() + 1 + 2);

        let (name1, _) = read_name(&buf, 0).unwrap();
        assert_eq!(name1, "example.com");
        let (name2, _) = read_name(&buf, first_len).unwrap();
        assert_eq!(name2, "www.example.com");
    }

    #[test]
    fn pointer_loop_is_rejected() {
        // a name at offset 0 that points to itself
        let buf = vec![0xC0, 0x00];
        assert_eq!(read_name(&buf, 0), Err(ParseError::PointerLoop));
    }

    #[test]
    fn mutated_name_round_trips_through_trailer() {
        let mut out = Vec::new();
        let patch = write_name_mutated_head(&mut out, "foo.example.com").unwrap();
        write_u16(&mut out, 1); // pretend qtype/qclass follow
        write_u16(&mut out, 1);
        apply_mutation_trailer(&mut out, patch);

        let (name, _) = read_name(&out, 0).unwrap();
        assert_eq!(name, "foo.example.com");
    }

    #[test]
    fn label_too_long_is_invalid() {
        let mut buf = vec![64u8];
        buf.extend(std::iter::repeat(b'a').take(64));
        assert_eq!(read_name(&buf, 0), Err(ParseError::InvalidLabel));
    }
}
