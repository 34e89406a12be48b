use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Package, PackageKey, StatusUpdate};
use crate::error::{IngestError, Result};

const MAGIC: &[u8; 8] = b"INGLOG\0\0";
const VERSION: u8 = 1;
const HEADER_LEN: u64 = 9;
const SUM_LEN: usize = 8;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TrackRecord {
    Register(Package),
    Update {
        key: PackageKey,
        revision: u64,
        update: StatusUpdate,
    },
    /// Free-text audit entry; does not change the index.
    Note {
        text: String,
    },
}

/// Append-only record log. Frame: uvarint payload length, CBOR payload,
/// first 8 bytes of the payload's blake3.
pub struct Journal {
    f: File,
    path: PathBuf,
}

impl Journal {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if f.metadata()?.len() == 0 {
            f.write_all(MAGIC)?;
            f.write_all(&[VERSION])?;
            f.sync_all()?;
        } else {
            let mut magic = [0u8; 8];
            let mut ver = [0u8; 1];
            f.read_exact(&mut magic)
                .and_then(|_| f.read_exact(&mut ver))
                .map_err(|_| IngestError::Tracking(format!("{}: short header", path.display())))?;
            if &magic != MAGIC {
                return Err(IngestError::Tracking(format!(
                    "{}: not a tracking journal",
                    path.display()
                )));
            }
            if ver[0] != VERSION {
                return Err(IngestError::Tracking(format!(
                    "{}: unsupported journal version {}",
                    path.display(),
                    ver[0]
                )));
            }
        }

        f.seek(SeekFrom::End(0))?;
        Ok(Self {
            f,
            path: path.to_path_buf(),
        })
    }

    pub fn append(&mut self, rec: &TrackRecord) -> Result<()> {
        let mut payload = Vec::with_capacity(256);
        ciborium::ser::into_writer(rec, &mut payload)
            .map_err(|e| IngestError::Tracking(format!("encode record: {e}")))?;

        let mut frame = Vec::with_capacity(payload.len() + 10 + SUM_LEN);
        put_uvarint(&mut frame, payload.len() as u64);
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&blake3::hash(&payload).as_bytes()[..SUM_LEN]);

        self.f.seek(SeekFrom::End(0))?;
        self.f.write_all(&frame)?;
        self.f.sync_data()?;
        Ok(())
    }

    /// Read every intact record. A torn or corrupt tail (crash mid-append) is
    /// cut off so later appends start from a clean frame boundary.
    pub fn replay(&mut self) -> Result<Vec<TrackRecord>> {
        let file_len = self.f.metadata()?.len();
        self.f.seek(SeekFrom::Start(HEADER_LEN))?;
        let mut records = Vec::new();
        let mut good_end = HEADER_LEN;
        {
            let mut r = BufReader::new(&mut self.f);
            loop {
                match read_frame(&mut r, file_len - good_end)? {
                    Frame::Record(rec, consumed) => {
                        records.push(rec);
                        good_end += consumed;
                    }
                    Frame::End => break,
                    Frame::Torn => {
                        tracing::warn!(
                            journal = %self.path.display(),
                            offset = good_end,
                            "discarding torn journal tail"
                        );
                        break;
                    }
                }
            }
        }
        if file_len > good_end {
            self.f.set_len(good_end)?;
        }
        self.f.seek(SeekFrom::End(0))?;
        Ok(records)
    }
}

enum Frame {
    Record(TrackRecord, u64),
    End,
    Torn,
}

/// `remaining` is the byte count left in the journal from the frame start;
/// a length that overruns it marks the tail as torn.
fn read_frame<R: Read>(r: &mut R, remaining: u64) -> Result<Frame> {
    let len = match get_uvarint(r) {
        Ok(Some(n)) => n,
        Ok(None) => return Ok(Frame::End),
        Err(_) => return Ok(Frame::Torn),
    };
    let body = remaining.saturating_sub(uvarint_len(len) as u64);
    if len.saturating_add(SUM_LEN as u64) > body {
        return Ok(Frame::Torn);
    }
    let mut payload = vec![0u8; len as usize];
    let mut sum = [0u8; SUM_LEN];
    if r.read_exact(&mut payload).is_err() || r.read_exact(&mut sum).is_err() {
        return Ok(Frame::Torn);
    }
    if blake3::hash(&payload).as_bytes()[..SUM_LEN] != sum {
        return Ok(Frame::Torn);
    }
    let rec: TrackRecord = ciborium::de::from_reader(&payload[..])
        .map_err(|e| IngestError::Tracking(format!("decode record: {e}")))?;
    let consumed = uvarint_len(len) as u64 + len + SUM_LEN as u64;
    Ok(Frame::Record(rec, consumed))
}

fn put_uvarint(out: &mut Vec<u8>, mut x: u64) {
    while x >= 0x80 {
        out.push((x as u8) | 0x80);
        x >>= 7;
    }
    out.push(x as u8);
}

fn get_uvarint<R: Read>(r: &mut R) -> std::io::Result<Option<u64>> {
    let mut x: u64 = 0;
    let mut s: u32 = 0;
    for i in 0..10 {
        let mut b = [0u8; 1];
        if r.read(&mut b)? == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        let byte = b[0];
        x |= ((byte & 0x7f) as u64) << s;
        if byte < 0x80 {
            return Ok(Some(x));
        }
        s += 7;
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "varint too long",
    ))
}

fn uvarint_len(mut x: u64) -> usize {
    let mut n = 1;
    while x >= 0x80 {
        x >>= 7;
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(text: &str) -> TrackRecord {
        TrackRecord::Note {
            text: text.to_string(),
        }
    }

    #[test]
    fn appended_records_replay_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.journal");
        {
            let mut j = Journal::open(&path).unwrap();
            j.append(&note("one")).unwrap();
            j.append(&note("two")).unwrap();
        }
        let mut j = Journal::open(&path).unwrap();
        assert_eq!(j.replay().unwrap(), vec![note("one"), note("two")]);
    }

    #[test]
    fn torn_tail_is_discarded_and_appends_continue() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.journal");
        {
            let mut j = Journal::open(&path).unwrap();
            j.append(&note("kept")).unwrap();
        }
        // half a frame, as if the process died mid-write
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0x20, 0xa1, 0x64]).unwrap();
        }
        let mut j = Journal::open(&path).unwrap();
        assert_eq!(j.replay().unwrap(), vec![note("kept")]);
        j.append(&note("after")).unwrap();

        let mut j = Journal::open(&path).unwrap();
        assert_eq!(j.replay().unwrap(), vec![note("kept"), note("after")]);
    }

    #[test]
    fn oversized_length_prefix_is_treated_as_torn() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.journal");
        {
            let mut j = Journal::open(&path).unwrap();
            j.append(&note("kept")).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f])
                .unwrap();
        }
        let mut j = Journal::open(&path).unwrap();
        assert_eq!(j.replay().unwrap(), vec![note("kept")]);
        j.append(&note("after")).unwrap();

        let mut j = Journal::open(&path).unwrap();
        assert_eq!(j.replay().unwrap(), vec![note("kept"), note("after")]);
    }

    #[test]
    fn foreign_file_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.journal");
        std::fs::write(&path, b"definitely not a journal").unwrap();
        assert!(Journal::open(&path).is_err());
    }
}
