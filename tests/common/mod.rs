//! Builds a minimal, uncompressed-only ITSS archive in memory, for
//! exercising directory resolution, enumeration, and the random-access
//! read laws without needing to author LZX-compressed fixtures.

pub const BLOCK_LEN: u32 = 0x2000;

/// One entry to place in the synthetic directory. `content` is `None` for
/// zero-length entries like the root directory marker.
pub struct FixtureEntry {
    pub path: &'static str,
    pub content: Option<Vec<u8>>,
}

fn encode_cword(mut n: u64) -> Vec<u8> {
    let mut groups = vec![(n & 0x7f) as u8];
    n >>= 7;
    while n != 0 {
        groups.push((n & 0x7f) as u8 | 0x80);
        n >>= 7;
    }
    groups.reverse();
    groups
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Builds the full archive byte image. Returns `(bytes, data_offset)`
/// where `data_offset` is where the caller can find each entry's content
/// at `data_offset + start`.
pub fn build_archive(entries: &[FixtureEntry]) -> Vec<u8> {
    let itsf_len: u64 = 0x58;
    let itsp_len: u32 = 0x54;
    let dir_offset = itsf_len;
    let dir_len = itsp_len as u64 + BLOCK_LEN as u64;
    let data_offset = dir_offset + dir_len;

    // Lay out content and compute each entry's (section=0, start, length).
    let mut content = Vec::new();
    let mut resolved: Vec<(u64, u64, u64)> = Vec::new(); // (section, start, length)
    for e in entries {
        match &e.content {
            Some(bytes) => {
                let start = content.len() as u64;
                content.extend_from_slice(bytes);
                resolved.push((0, start, bytes.len() as u64));
            }
            None => resolved.push((0, 0, 0)),
        }
    }

    // PMGL page: header + entries, single leaf, no siblings.
    let mut page_body = Vec::new();
    for (e, (section, start, length)) in entries.iter().zip(resolved.iter()) {
        page_body.extend(encode_cword(e.path.len() as u64));
        page_body.extend_from_slice(e.path.as_bytes());
        page_body.extend(encode_cword(*section));
        page_body.extend(encode_cword(*start));
        page_body.extend(encode_cword(*length));
    }
    assert!(
        page_body.len() + 0x14 <= BLOCK_LEN as usize,
        "fixture directory entries overflow BLOCK_LEN"
    );
    let free_space = BLOCK_LEN - 0x14 - page_body.len() as u32;

    let mut pmgl = Vec::new();
    pmgl.extend_from_slice(b"PMGL");
    push_u32(&mut pmgl, free_space);
    push_u32(&mut pmgl, 0); // unknown_0008
    push_i32(&mut pmgl, -1); // block_prev
    push_i32(&mut pmgl, -1); // block_next
    pmgl.extend(page_body);
    pmgl.resize(BLOCK_LEN as usize, 0);

    // ITSP header.
    let mut itsp = Vec::new();
    itsp.extend_from_slice(b"ITSP");
    push_i32(&mut itsp, 1); // version
    push_i32(&mut itsp, itsp_len as i32); // header_len
    push_u32(&mut itsp, 0); // unknown_000c
    push_u32(&mut itsp, BLOCK_LEN); // block_len
    push_u32(&mut itsp, 2); // blockidx_intvl
    push_i32(&mut itsp, 0); // index_depth
    push_i32(&mut itsp, -1); // index_root: no PMGI, normalized to index_head
    push_i32(&mut itsp, 0); // index_head
    push_u32(&mut itsp, 0); // unknown_0024
    push_u32(&mut itsp, 1); // num_blocks
    push_u32(&mut itsp, 0); // unknown_002c
    push_u32(&mut itsp, 0x409); // lang_id
    itsp.extend_from_slice(uuid::Uuid::nil().as_bytes());
    itsp.extend_from_slice(&[0u8; 16]); // unknown_0044
    assert_eq!(itsp.len(), itsp_len as usize);

    // ITSF header (version 2: data_offset is derived as dir_offset + dir_len).
    let mut itsf = Vec::new();
    itsf.extend_from_slice(b"ITSF");
    push_i32(&mut itsf, 2); // version
    push_i32(&mut itsf, itsf_len as i32); // header_len
    push_u32(&mut itsf, 0); // unknown_000c
    push_u32(&mut itsf, 0); // last_modified
    push_u32(&mut itsf, 0x409); // lang_id
    itsf.extend_from_slice(uuid::Uuid::nil().as_bytes()); // dir_uuid
    itsf.extend_from_slice(uuid::Uuid::nil().as_bytes()); // stream_uuid
    push_u64(&mut itsf, 0); // unknown_offset
    push_u64(&mut itsf, 0); // unknown_len
    push_u64(&mut itsf, dir_offset);
    push_u64(&mut itsf, dir_len);
    assert_eq!(itsf.len(), itsf_len as usize);

    let mut archive = Vec::new();
    archive.extend(itsf);
    archive.extend(itsp);
    archive.extend(pmgl);
    assert_eq!(archive.len() as u64, data_offset);
    archive.extend(content);
    archive
}
