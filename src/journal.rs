use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::LedgerEvent;

/// Encode one journal entry — a batch of events committed as a unit — as
/// `[u32 len][bincode payload][u32 crc32]`. The checksum covers the whole
/// batch, so replay accepts or drops it atomically.
fn encode_entry(writer: &mut impl Write, events: &[LedgerEvent]) -> io::Result<()> {
    let payload =
        bincode::serialize(events).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read one entry. `Ok(None)` means a clean or crash-truncated end of file;
/// corrupt payloads also end the stream (the tail after a torn write is
/// unusable). A torn entry loses every event in it — never a prefix.
fn read_entry(reader: &mut impl Read) -> io::Result<Option<Vec<LedgerEvent>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let mut crc_buf = [0u8; 4];
    match reader.read_exact(&mut crc_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }

    Ok(bincode::deserialize(&payload).ok())
}

/// Append-only ledger journal.
///
/// Every committed mutation is an entry here; the in-memory ledger is a pure
/// replay of this file. A multi-item operation (kit reserve, transfer,
/// replace) writes all of its events as ONE entry, so a crash can never leave
/// a durable partial kit. Appends are buffered and fsynced in batches by the
/// scheduler's group-commit writer task.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer one entry (an atomic batch of events) without flushing or
    /// syncing. Call `flush_sync()` after the group to durably commit
    /// everything buffered.
    pub fn append_buffered(&mut self, events: &[LedgerEvent]) -> io::Result<()> {
        encode_entry(&mut self.writer, events)?;
        self.appends_since_compact += events.len() as u64;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Append one entry and fsync immediately. Test convenience —
    /// production writes go through `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, events: &[LedgerEvent]) -> io::Result<()> {
        self.append_buffered(events)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a compacted journal (one snapshot entry) to a temp file and
    /// fsync it. The slow I/O phase — runs outside the writer's critical path.
    pub fn write_compact_file(path: &Path, events: &[LedgerEvent]) -> io::Result<()> {
        let tmp_path = path.with_extension("journal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        encode_entry(&mut writer, events)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename the temp file over the journal and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[LedgerEvent]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Replay the journal from disk, returning all events from intact
    /// entries. A missing file is an empty ledger, not an error.
    pub fn replay(path: &Path) -> io::Result<Vec<LedgerEvent>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(batch) = read_entry(&mut reader)? {
            events.extend(batch);
        }
        Ok(events)
    }
}
