//! Session file: one JSON history record per tab, concatenated.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use capsule_types::error::Result;

use crate::history::History;

/// Write one record per history, each followed by a newline.
pub fn save<'a>(path: &Path, histories: impl IntoIterator<Item = &'a History>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut count = 0;
    for history in histories {
        serde_json::to_writer(&mut out, history)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    log::info!("Saved {count} tabs to {}", path.display());
    Ok(())
}

/// Read every record in the file. A missing file is an empty session.
/// Any malformed record fails the whole load.
pub fn load(path: &Path) -> Result<Vec<History>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let histories = serde_json::Deserializer::from_reader(BufReader::new(file))
        .into_iter::<History>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    log::info!("Loaded {} tabs from {}", histories.len(), path.display());
    Ok(histories)
}

#[cfg(test)]
mod tests {
    use capsule_types::error::CapsuleError;

    use super::*;

    #[test]
    fn round_trip_preserves_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = History::new();
        first.add("gemini://a/");
        first.add("gemini://b/");
        first.back();
        let mut second = History::new();
        second.add("gopher://c/");

        save(&path, [&first, &second]).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.json")).unwrap().is_empty());
    }

    #[test]
    fn reads_concatenated_records_without_separators() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"{"URLs":[{"URL":"gemini://a/","ScrollPos":1}],"Pos":0}{"URLs":null,"Pos":0}"#,
        )
        .unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].current().unwrap().scroll_pos, 1);
        assert!(loaded[1].is_empty());
    }

    #[test]
    fn corrupt_file_fails_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{\"URLs\":[],\"Pos\":0}\n{garbage").unwrap();
        assert!(matches!(load(&path), Err(CapsuleError::Json(_))));
    }
}
