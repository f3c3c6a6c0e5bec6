//! Delimited-record track database
//!
//! `musiclib.dsv` is a caret-delimited flat file, one track per line,
//! written and rewritten by the external maintenance scripts. This module
//! parses it into an ordered, fixed-shape record set and exposes the set
//! through a shared read-only handle. The only way the in-memory state
//! changes is a wholesale [`Library::reload`]; there is no incremental row
//! update.
//!
//! Parse tolerance is deliberate: the file is mutated by concurrent,
//! independent tooling, so malformed rows are repaired (padding, defaults)
//! rather than rejected - always show something recoverable.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::events::{EventBus, MusiclibEvent};

/// Field separator used by musiclib.dsv
pub const DSV_DELIMITER: char = '^';

/// Fixed number of fields per record
pub const FIELD_COUNT: usize = 13;

/// Column titles, in file order, for tabular presentation
pub const FIELD_TITLES: [&str; FIELD_COUNT] = [
    "ID",
    "Artist",
    "IDAlbum",
    "Album",
    "Album Artist",
    "Title",
    "Path",
    "Genre",
    "Length",
    "Rating",
    "Custom2",
    "Stars",
    "Last Played",
];

/// One row of musiclib.dsv, representing a track
///
/// All fields are carried as raw text; display conversion happens on read
/// (see [`crate::display`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRecord {
    pub id: String,
    pub artist: String,
    pub album_id: String,
    pub album: String,
    pub album_artist: String,
    pub title: String,
    pub path: String,
    pub genre: String,
    /// Track length in milliseconds, textual
    pub length_ms: String,
    /// Raw legacy POPM value - carried through, never a display rating
    pub rating: String,
    pub custom2: String,
    /// Star rating 0-5; the only trustworthy rating signal
    pub stars: String,
    /// Fractional serial day-count (see [`crate::time`])
    pub last_played: String,
}

impl TrackRecord {
    /// Build a record from split fields, right-padding short rows with
    /// empty strings
    fn from_fields(mut fields: Vec<String>) -> Self {
        fields.resize_with(FIELD_COUNT, String::new);
        let mut it = fields.into_iter();
        // Order matches the file column order
        TrackRecord {
            id: it.next().unwrap_or_default(),
            artist: it.next().unwrap_or_default(),
            album_id: it.next().unwrap_or_default(),
            album: it.next().unwrap_or_default(),
            album_artist: it.next().unwrap_or_default(),
            title: it.next().unwrap_or_default(),
            path: it.next().unwrap_or_default(),
            genre: it.next().unwrap_or_default(),
            length_ms: it.next().unwrap_or_default(),
            rating: it.next().unwrap_or_default(),
            custom2: it.next().unwrap_or_default(),
            stars: it.next().unwrap_or_default(),
            last_played: it.next().unwrap_or_default(),
        }
    }

    /// Field text by column index, in file order
    pub fn field(&self, index: usize) -> &str {
        match index {
            0 => &self.id,
            1 => &self.artist,
            2 => &self.album_id,
            3 => &self.album,
            4 => &self.album_artist,
            5 => &self.title,
            6 => &self.path,
            7 => &self.genre,
            8 => &self.length_ms,
            9 => &self.rating,
            10 => &self.custom2,
            11 => &self.stars,
            12 => &self.last_played,
            _ => "",
        }
    }
}

/// Parse records from any line source
///
/// The first non-blank line is a header and is always skipped, regardless
/// of content. Blank lines are skipped entirely (they never become padded
/// empty records). Record order equals line order.
pub fn parse_records<R: BufRead>(reader: R) -> std::io::Result<Vec<TrackRecord>> {
    let mut records = Vec::new();
    let mut header_seen = false;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !header_seen {
            header_seen = true;
            continue;
        }

        let fields: Vec<String> = line.split(DSV_DELIMITER).map(str::to_string).collect();
        records.push(TrackRecord::from_fields(fields));
    }

    Ok(records)
}

/// Shared handle over the current record set
///
/// The library is the sole owner of its records; consumers get cheap
/// read-only snapshots and must not expect them to change in place - a
/// successful [`reload`](Library::reload) swaps in a complete new set.
#[derive(Clone)]
pub struct Library {
    path: PathBuf,
    records: Arc<RwLock<Arc<Vec<TrackRecord>>>>,
    events: EventBus,
}

impl Library {
    /// Create a handle for a database path without touching the disk.
    /// Call [`reload`](Library::reload) to populate it.
    pub fn open(path: impl Into<PathBuf>, events: EventBus) -> Self {
        Self {
            path: path.into(),
            records: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            events,
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-parse the backing file and atomically replace the record set
    ///
    /// A parse that completes with zero data rows is a valid empty state.
    /// On failure to open or read the file the existing record set is left
    /// untouched, a `DatabaseLoadFailed` event is emitted, and the error is
    /// returned.
    pub fn reload(&self) -> Result<usize> {
        let parsed = File::open(&self.path)
            .map(BufReader::new)
            .and_then(parse_records);

        match parsed {
            Ok(tracks) => {
                let count = tracks.len();
                *self.records.write().expect("library lock poisoned") = Arc::new(tracks);
                tracing::info!(path = %self.path.display(), tracks = count, "database loaded");
                self.events.emit(MusiclibEvent::DatabaseLoaded {
                    path: self.path.display().to_string(),
                    tracks: count,
                    timestamp: chrono::Utc::now(),
                });
                Ok(count)
            }
            Err(source) => {
                let err = Error::DatabaseOpen {
                    path: self.path.clone(),
                    source,
                };
                tracing::warn!(path = %self.path.display(), "database load failed: {err}");
                self.events.emit(MusiclibEvent::DatabaseLoadFailed {
                    path: self.path.display().to_string(),
                    message: err.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                Err(err)
            }
        }
    }

    /// Number of records currently loaded
    pub fn row_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Number of fields per record, fixed at [`FIELD_COUNT`]
    pub fn field_count(&self) -> usize {
        FIELD_COUNT
    }

    /// Record at a given position, or an empty sentinel record when the
    /// index is out of bounds. Never panics.
    pub fn record_at(&self, row: usize) -> TrackRecord {
        self.snapshot().get(row).cloned().unwrap_or_default()
    }

    /// Read-only snapshot of the full ordered record set
    pub fn snapshot(&self) -> Arc<Vec<TrackRecord>> {
        Arc::clone(&self.records.read().expect("library lock poisoned"))
    }

    /// All records whose album identifier equals `album_id`, in file order
    pub fn records_for_album(&self, album_id: &str) -> Vec<TrackRecord> {
        self.snapshot()
            .iter()
            .filter(|r| r.album_id == album_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    fn record(id: &str, artist: &str, album_id: &str, title: &str) -> TrackRecord {
        TrackRecord {
            id: id.into(),
            artist: artist.into(),
            album_id: album_id.into(),
            album: "Album".into(),
            album_artist: artist.into(),
            title: title.into(),
            path: format!("/mnt/music/{artist}/{title}.mp3"),
            genre: "Rock".into(),
            length_ms: "215000".into(),
            rating: "196".into(),
            custom2: String::new(),
            stars: "4".into(),
            last_played: "45103.25".into(),
        }
    }

    fn to_dsv_line(r: &TrackRecord) -> String {
        (0..FIELD_COUNT)
            .map(|i| r.field(i))
            .collect::<Vec<_>>()
            .join("^")
    }

    fn parse_str(input: &str) -> Vec<TrackRecord> {
        parse_records(Cursor::new(input)).unwrap()
    }

    #[test]
    fn test_round_trip_field_for_field() {
        let originals = vec![
            record("1", "Nina Simone", "10", "Sinnerman"),
            record("2", "Nina Simone", "10", "Feeling Good"),
            record("3", "Tom Waits", "11", "Ol' 55"),
        ];
        let mut file = String::from("header line\n");
        for r in &originals {
            file.push_str(&to_dsv_line(r));
            file.push('\n');
        }

        let loaded = parse_str(&file);
        assert_eq!(loaded, originals);
    }

    #[test]
    fn test_header_skipped_regardless_of_content() {
        // Even a header that looks exactly like a data row is discarded
        let data_like_header = to_dsv_line(&record("0", "Header", "0", "Not A Track"));
        let input = format!("{data_like_header}\n{}\n", to_dsv_line(&record("1", "A", "1", "T")));
        let loaded = parse_str(&input);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "1");
    }

    #[test]
    fn test_short_rows_padded_with_empty_fields() {
        let loaded = parse_str("header\n7^Artist^3\n");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "7");
        assert_eq!(loaded[0].artist, "Artist");
        assert_eq!(loaded[0].album_id, "3");
        assert_eq!(loaded[0].album, "");
        assert_eq!(loaded[0].last_played, "");
    }

    #[test]
    fn test_blank_lines_skipped_entirely() {
        let a = to_dsv_line(&record("1", "A", "1", "T1"));
        let b = to_dsv_line(&record("2", "B", "2", "T2"));
        let with_blanks = format!("header\n\n{a}\n   \n\n{b}\n\n");
        let without_blanks = format!("header\n{a}\n{b}\n");
        assert_eq!(parse_str(&with_blanks), parse_str(&without_blanks));
    }

    #[test]
    fn test_record_order_equals_line_order() {
        let input = format!(
            "header\n{}\n{}\n{}\n",
            to_dsv_line(&record("9", "Z", "1", "Last Alphabetically")),
            to_dsv_line(&record("1", "A", "1", "First Alphabetically")),
            to_dsv_line(&record("5", "M", "1", "Middle")),
        );
        let loaded = parse_str(&input);
        let ids: Vec<&str> = loaded.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["9", "1", "5"]);
    }

    #[test]
    fn test_header_only_file_is_valid_and_empty() {
        assert!(parse_str("just a header\n").is_empty());
        assert!(parse_str("").is_empty());
    }

    #[test]
    fn test_record_at_out_of_bounds_is_sentinel() {
        let lib = Library::open("/nonexistent/musiclib.dsv", EventBus::default());
        assert_eq!(lib.record_at(999), TrackRecord::default());
    }

    #[test]
    fn test_reload_failure_preserves_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("musiclib.dsv");
        let mut f = File::create(&db).unwrap();
        writeln!(f, "header").unwrap();
        writeln!(f, "{}", to_dsv_line(&record("1", "A", "1", "T"))).unwrap();
        drop(f);

        let lib = Library::open(&db, EventBus::default());
        assert_eq!(lib.reload().unwrap(), 1);

        std::fs::remove_file(&db).unwrap();
        assert!(lib.reload().is_err());
        // Last-good record set still in place
        assert_eq!(lib.row_count(), 1);
        assert_eq!(lib.record_at(0).id, "1");
    }

    #[test]
    fn test_reload_empty_file_is_valid_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("musiclib.dsv");
        std::fs::write(&db, "header only\n").unwrap();

        let lib = Library::open(&db, EventBus::default());
        assert_eq!(lib.reload().unwrap(), 0);
        assert_eq!(lib.row_count(), 0);
    }

    #[test]
    fn test_records_for_album_filters_by_album_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("musiclib.dsv");
        let body = format!(
            "header\n{}\n{}\n{}\n",
            to_dsv_line(&record("1", "A", "10", "T1")),
            to_dsv_line(&record("2", "B", "11", "T2")),
            to_dsv_line(&record("3", "A", "10", "T3")),
        );
        std::fs::write(&db, body).unwrap();

        let lib = Library::open(&db, EventBus::default());
        lib.reload().unwrap();

        let album = lib.records_for_album("10");
        assert_eq!(album.len(), 2);
        assert_eq!(album[0].id, "1");
        assert_eq!(album[1].id, "3");
        assert!(lib.records_for_album("99").is_empty());
    }
}
