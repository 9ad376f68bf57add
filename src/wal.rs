use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// An appointment snapshot never comes close to this; a larger length prefix
/// means the tail is garbage.
const MAX_RECORD_LEN: usize = 64 * 1024;

fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut record = Vec::with_capacity(payload.len() + 8);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&payload);
    record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    writer.write_all(&record)
}

/// `Ok(false)` on a clean or torn end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next verified payload, or `None` once the log ends or stops making sense.
fn read_record(reader: &mut impl Read, path: &Path) -> io::Result<Option<Vec<u8>>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_RECORD_LEN {
        tracing::warn!("WAL {}: record length {len} out of range, discarding tail", path.display());
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        tracing::warn!("WAL {}: CRC mismatch, discarding tail", path.display());
        return Ok(None);
    }
    Ok(Some(payload))
}

fn open_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn compact_tmp_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

/// Append-only log of appointment snapshots.
///
/// Each record is `[u32 len][bincode Event][u32 crc32]`, little-endian, with
/// `len` counting the payload only. A torn final record left by a crash fails
/// the length or CRC check; `recover` cuts it off before new records go in.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length after the last successful `flush_sync`. A failed batch is
    /// truncated back to it.
    committed_len: u64,
    committed_appends: u64,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let writer = open_append(path)?;
        let committed_len = writer.get_ref().metadata()?.len();
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            appends_since_compact: 0,
            committed_len,
            committed_appends: 0,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Replay `path`, drop any torn or corrupt tail from the file, and open it
    /// for appending after the last intact record.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, intact_len) = scan(path)?;
        match fs::metadata(path) {
            Ok(meta) if meta.len() > intact_len => {
                tracing::warn!(
                    "WAL {}: truncating {} bytes of damaged tail",
                    path.display(),
                    meta.len() - intact_len
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(intact_len)?;
                file.sync_all()?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok((Self::open(path)?, events))
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one record. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        #[cfg(test)]
        {
            if std::mem::take(&mut self.fail_next_sync) {
                return Err(io::Error::other("injected sync failure"));
            }
        }
        self.writer.get_ref().sync_all()?;
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.committed_appends = self.appends_since_compact;
        Ok(())
    }

    /// Throw away everything since the last successful `flush_sync`: buffered
    /// bytes are dropped unwritten and the file is cut back to its committed
    /// length.
    pub fn rollback(&mut self) -> io::Result<()> {
        let fresh = open_append(&self.path)?;
        let (file, _unwritten) = std::mem::replace(&mut self.writer, fresh).into_parts();
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.appends_since_compact = self.committed_appends;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_next_sync(&mut self) {
        self.fail_next_sync = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First half of compaction: write `events` to a synced side file.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(compact_tmp_path(path))?);
        for event in events {
            write_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Second half: rename the side file over the log and reopen it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compact_tmp_path(&self.path), &self.path)?;
        self.writer = open_append(&self.path)?;
        self.committed_len = self.writer.get_ref().metadata()?.len();
        self.appends_since_compact = 0;
        self.committed_appends = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in `path`, oldest first. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}

/// Intact events plus the byte length of the prefix that holds them.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let mut reader = match File::open(path) {
        Ok(f) => BufReader::new(f),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };

    let mut events = Vec::new();
    let mut intact_len = 0u64;
    while let Some(payload) = read_record(&mut reader, path)? {
        match bincode::deserialize::<Event>(&payload) {
            Ok(event) => {
                events.push(event);
                intact_len += payload.len() as u64 + 8;
            }
            Err(e) => {
                tracing::warn!("WAL {}: undecodable record ({e}), discarding tail", path.display());
                break;
            }
        }
    }
    Ok((events, intact_len))
}
