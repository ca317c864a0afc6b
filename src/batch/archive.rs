//! Per-subject result archive (`.nce`).
//!
//! Layout: MAGIC, version, then LZ4 chunks:
//! - `META`: subject, group, region count, state labels, pairs
//! - `BASE`: baseline energy per pair
//! - `PERT`: perturbed energies, one vector per pair
//! - `FAIL`: failure records
//!
//! Derived values (rERC, means, summaries) are not stored; loading recomputes
//! them from the energies. Unknown chunks are skipped.

use std::io::{self, Read, Write};

use super::{FailureRecord, SubjectReport};
use crate::config::RunConfig;
use crate::error::FailureReason;
use crate::state::TransitionPair;
use crate::storage;

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn write_index<W: Write>(w: &mut W, v: usize) -> io::Result<()> {
    storage::write_len(w, v)
}

fn read_index<R: Read>(r: &mut R) -> io::Result<usize> {
    Ok(storage::read_u32_le(r)? as usize)
}

fn write_optional_string<W: Write>(w: &mut W, s: Option<&str>) -> io::Result<()> {
    match s {
        Some(s) => {
            storage::write_u8(w, 1)?;
            storage::write_string(w, s)
        }
        None => storage::write_u8(w, 0),
    }
}

fn read_optional_string<R: Read>(r: &mut R) -> io::Result<Option<String>> {
    match storage::read_u8(r)? {
        0 => Ok(None),
        1 => storage::read_string(r).map(Some),
        _ => Err(invalid("bad presence flag")),
    }
}

struct Meta {
    subject: String,
    group: Option<String>,
    regions: usize,
    state_labels: Vec<String>,
    pairs: Vec<TransitionPair>,
}

impl SubjectReport {
    pub fn save_archive_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;

        self.write_meta_chunk(w)?;
        let mut payload = Vec::new();
        storage::write_optional_f64s(&mut payload, &self.baseline)?;
        storage::write_chunk_lz4(w, *b"BASE", &payload)?;
        self.write_perturbed_chunk(w)?;
        self.write_failure_chunk(w)
    }

    /// Load an archive and recompute the derived values under `cfg`.
    pub fn load_archive_from<R: Read>(r: &mut R, cfg: &RunConfig) -> io::Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(invalid("bad archive magic"));
        }
        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_CURRENT {
            return Err(invalid("unsupported archive version"));
        }

        let mut meta: Option<Meta> = None;
        let mut baseline: Option<Vec<Option<f64>>> = None;
        let mut perturbed: Option<Vec<Vec<Option<f64>>>> = None;
        let mut failures: Vec<FailureRecord> = Vec::new();

        loop {
            let (tag, len) = match storage::read_chunk_header(r) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            let payload = storage::read_chunk_payload(r, len)?;
            let mut cursor = io::Cursor::new(payload);
            match &tag {
                b"META" => meta = Some(Self::read_meta_payload(&mut cursor)?),
                b"BASE" => baseline = Some(storage::read_optional_f64s(&mut cursor)?),
                b"PERT" => perturbed = Some(Self::read_perturbed_payload(&mut cursor)?),
                b"FAIL" => {
                    let subject = meta
                        .as_ref()
                        .map(|m| m.subject.clone())
                        .ok_or_else(|| invalid("FAIL before META"))?;
                    failures = Self::read_failure_payload(&mut cursor, &subject)?;
                }
                _ => {
                    // Unknown chunk: skipped.
                }
            }
        }

        let meta = meta.ok_or_else(|| invalid("missing META"))?;
        let baseline = baseline.ok_or_else(|| invalid("missing BASE"))?;
        let perturbed = perturbed.ok_or_else(|| invalid("missing PERT"))?;
        if baseline.len() != meta.pairs.len()
            || perturbed.len() != meta.pairs.len()
            || perturbed.iter().any(|row| row.len() != meta.regions)
        {
            return Err(invalid("energy table shape does not match META"));
        }

        let mut report = SubjectReport::empty(
            meta.subject,
            meta.group,
            meta.regions,
            meta.state_labels,
            meta.pairs,
        );
        report.baseline = baseline;
        report.perturbed = perturbed;
        report.failures = failures;
        report.finish(cfg);
        Ok(report)
    }

    fn write_meta_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut payload = Vec::new();
        storage::write_string(&mut payload, &self.subject)?;
        write_optional_string(&mut payload, self.group.as_deref())?;
        write_index(&mut payload, self.regions)?;
        storage::write_len(&mut payload, self.state_labels.len())?;
        for label in &self.state_labels {
            storage::write_string(&mut payload, label)?;
        }
        storage::write_len(&mut payload, self.pairs.len())?;
        for pair in &self.pairs {
            write_index(&mut payload, pair.from)?;
            write_index(&mut payload, pair.to)?;
        }
        storage::write_chunk_lz4(w, *b"META", &payload)
    }

    fn read_meta_payload<R: Read>(r: &mut R) -> io::Result<Meta> {
        let subject = storage::read_string(r)?;
        let group = read_optional_string(r)?;
        let regions = read_index(r)?;
        let n_labels = read_index(r)?;
        let state_labels = (0..n_labels)
            .map(|_| storage::read_string(r))
            .collect::<io::Result<Vec<_>>>()?;
        let n_pairs = read_index(r)?;
        let mut pairs = Vec::with_capacity(n_pairs.min(1 << 16));
        for _ in 0..n_pairs {
            let from = read_index(r)?;
            let to = read_index(r)?;
            pairs.push(TransitionPair::new(from, to));
        }
        Ok(Meta {
            subject,
            group,
            regions,
            state_labels,
            pairs,
        })
    }

    fn write_perturbed_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut payload = Vec::new();
        storage::write_len(&mut payload, self.perturbed.len())?;
        for row in &self.perturbed {
            storage::write_optional_f64s(&mut payload, row)?;
        }
        storage::write_chunk_lz4(w, *b"PERT", &payload)
    }

    fn read_perturbed_payload<R: Read>(r: &mut R) -> io::Result<Vec<Vec<Option<f64>>>> {
        let n = read_index(r)?;
        (0..n).map(|_| storage::read_optional_f64s(r)).collect()
    }

    fn write_failure_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut payload = Vec::new();
        storage::write_len(&mut payload, self.failures.len())?;
        for f in &self.failures {
            write_index(&mut payload, f.from)?;
            write_index(&mut payload, f.to)?;
            match f.region {
                Some(region) => {
                    storage::write_u8(&mut payload, 1)?;
                    write_index(&mut payload, region)?;
                }
                None => storage::write_u8(&mut payload, 0)?,
            }
            storage::write_u8(&mut payload, f.reason.code())?;
            storage::write_string(&mut payload, &f.detail)?;
        }
        storage::write_chunk_lz4(w, *b"FAIL", &payload)
    }

    fn read_failure_payload<R: Read>(r: &mut R, subject: &str) -> io::Result<Vec<FailureRecord>> {
        let n = read_index(r)?;
        let mut failures = Vec::with_capacity(n.min(1 << 16));
        for _ in 0..n {
            let from = read_index(r)?;
            let to = read_index(r)?;
            let region = match storage::read_u8(r)? {
                0 => None,
                1 => Some(read_index(r)?),
                _ => return Err(invalid("bad presence flag")),
            };
            let reason = FailureReason::from_code(storage::read_u8(r)?)
                .ok_or_else(|| invalid("unknown failure reason code"))?;
            let detail = storage::read_string(r)?;
            failures.push(FailureRecord {
                subject: subject.to_string(),
                from,
                to,
                region,
                reason,
                detail,
            });
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{run_subject, SubjectInput};
    use super::*;
    use crate::exec::CancelToken;
    use crate::state::BrainState;
    use nalgebra::DMatrix;

    fn report() -> SubjectReport {
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 0.5, 0.2, 0.5, 0.0, 0.4, 0.2, 0.4, 0.0]);
        let states = vec![
            BrainState::new("Vis", vec![1.0, 0.0, 0.0]),
            BrainState::new("SomMot", vec![0.0, 1.0, 0.0]),
            BrainState::new("Limbic", vec![0.0, 0.0, 0.0]),
        ];
        let input = SubjectInput::new("sub-07", a, states).with_group("controls");
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10).with_persistence(true);
        run_subject(&input, &cfg, &CancelToken::new())
    }

    #[test]
    fn archive_roundtrip_keeps_energies_and_failures() {
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10).with_persistence(true);
        let original = report();
        assert!(!original.failures.is_empty());

        let mut bytes = Vec::new();
        original.save_archive_to(&mut bytes).unwrap();
        let loaded = SubjectReport::load_archive_from(&mut io::Cursor::new(bytes), &cfg).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10).with_persistence(true);
        let original = report();
        let mut bytes = Vec::new();
        original.save_archive_to(&mut bytes).unwrap();
        storage::write_chunk_lz4(&mut bytes, *b"XTRA", b"future data").unwrap();

        let loaded = SubjectReport::load_archive_from(&mut io::Cursor::new(bytes), &cfg).unwrap();
        assert_eq!(loaded.baseline, original.baseline);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10);
        let err = SubjectReport::load_archive_from(&mut io::Cursor::new(b"NOTANARCHIVE".to_vec()), &cfg)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
