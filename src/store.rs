//! Append-only CSV persistence for bets.
//!
//! `scan()` reads the whole file once under the store lock and hands back
//! an owned `Vec<Bet>` — the draw is the only caller and it always wants
//! every record anyway.

use crate::bet::Bet;
use crate::error::{ServerError, ServerResult};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;

/// Append-only, full-scan bet store backed by a single CSV file.
///
/// `append` and `scan` both take the same blocking-thread mutex so that
/// batches never interleave and a scan never observes a half-written batch.
pub struct BetStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl BetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Persists `batch` atomically with respect to other `append`/`scan`
    /// calls. Flushed before returning.
    pub async fn append(&self, batch: Vec<Bet>) -> ServerResult<()> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);

        task::spawn_blocking(move || -> ServerResult<()> {
            let _guard = lock.lock();

            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
            for bet in &batch {
                writer
                    .write_record(&[
                        bet.agency.to_string(),
                        bet.first_name.clone(),
                        bet.last_name.clone(),
                        bet.document.to_string(),
                        bet.birthdate.format("%Y-%m-%d").to_string(),
                        bet.number.to_string(),
                    ])
                    .map_err(|e| ServerError::Store(e.to_string()))?;
            }
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| ServerError::Store(format!("append task panicked: {e}")))?
    }

    /// Returns every bet persisted before this call started, in file order.
    pub async fn scan(&self) -> ServerResult<Vec<Bet>> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);

        task::spawn_blocking(move || -> ServerResult<Vec<Bet>> {
            let _guard = lock.lock();

            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(ServerError::from(e)),
            };

            let mut reader = ReaderBuilder::new().has_headers(false).from_reader(file);
            let mut bets = Vec::new();
            for result in reader.records() {
                let record = result.map_err(|e| ServerError::Store(e.to_string()))?;
                bets.push(parse_record(&record)?);
            }
            Ok(bets)
        })
        .await
        .map_err(|e| ServerError::Store(format!("scan task panicked: {e}")))?
    }
}

fn parse_record(record: &StringRecord) -> ServerResult<Bet> {
    let field = |idx: usize, name: &str| -> ServerResult<&str> {
        record
            .get(idx)
            .ok_or_else(|| ServerError::Store(format!("row missing {name} column")))
    };

    let agency: u8 = field(0, "agency")?
        .parse()
        .map_err(|_| ServerError::Store("bad agency column".to_string()))?;
    let first_name = field(1, "first_name")?.to_string();
    let last_name = field(2, "last_name")?.to_string();
    let document: u32 = field(3, "document")?
        .parse()
        .map_err(|_| ServerError::Store("bad document column".to_string()))?;
    let birthdate = chrono::NaiveDate::parse_from_str(field(4, "birthdate")?, "%Y-%m-%d")
        .map_err(|_| ServerError::Store("bad birthdate column".to_string()))?;
    let number: u16 = field(5, "number")?
        .parse()
        .map_err(|_| ServerError::Store("bad number column".to_string()))?;

    Ok(Bet {
        agency,
        first_name,
        last_name,
        document,
        birthdate,
        number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bet(agency: u8, document: u32, number: u16) -> Bet {
        Bet {
            agency,
            first_name: "John".to_string(),
            last_name: "Doe".to_string(),
            document,
            birthdate: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            number,
        }
    }

    #[tokio::test]
    async fn scan_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = BetStore::new(dir.path().join("bets.csv"));
        assert_eq!(store.scan().await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn append_then_scan_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BetStore::new(dir.path().join("bets.csv"));

        store
            .append(vec![sample_bet(1, 10, 7574), sample_bet(1, 11, 1)])
            .await
            .unwrap();
        store.append(vec![sample_bet(2, 20, 7574)]).await.unwrap();

        let mut bets = store.scan().await.unwrap();
        bets.sort_by_key(|b| b.document);

        assert_eq!(bets.len(), 3);
        assert_eq!(bets[0].document, 10);
        assert_eq!(bets[0].agency, 1);
        assert_eq!(bets[1].document, 11);
        assert_eq!(bets[2].document, 20);
        assert_eq!(bets[2].agency, 2);
    }

    #[tokio::test]
    async fn scan_reflects_only_batches_written_before_it_started() {
        let dir = tempfile::tempdir().unwrap();
        let store = BetStore::new(dir.path().join("bets.csv"));

        store.append(vec![sample_bet(1, 1, 7574)]).await.unwrap();
        let bets = store.scan().await.unwrap();
        assert_eq!(bets.len(), 1);

        store.append(vec![sample_bet(1, 2, 7574)]).await.unwrap();
        let bets = store.scan().await.unwrap();
        assert_eq!(bets.len(), 2);
    }
}
