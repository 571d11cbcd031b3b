//! Final score-board writer.
//!
//! One CSV row per roster team, written once at match end in ranking order.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

/// One team's final result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreRecord {
    pub team: String,
    /// Mark-to-market profit in cents.
    pub profit: i64,
    /// Final ETF position in lots.
    pub position: i64,
    /// Fills the team participated in.
    pub trades: u64,
    /// Error replies the team provoked.
    pub errors: u64,
}

/// Writes the final ranking.
pub struct ScoreBoardWriter {
    path: PathBuf,
}

impl ScoreBoardWriter {
    /// Create a writer targeting `path`.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Write all records and flush.
    pub async fn write(&self, records: &[ScoreRecord]) -> std::io::Result<()> {
        let file = File::create(&self.path).await?;
        let mut out = BufWriter::new(file);
        out.write_all(b"team,profit,final_position,trades,errors\n")
            .await?;
        for record in records {
            let line = format!(
                "{},{},{},{},{}\n",
                record.team, record.profit, record.position, record.trades, record.errors,
            );
            out.write_all(line.as_bytes()).await?;
        }
        out.flush().await?;
        info!(teams = records.len(), path = %self.path.display(), "score board written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_records_in_given_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("score_board.csv");
        let writer = ScoreBoardWriter::new(&path);
        writer
            .write(&[
                ScoreRecord {
                    team: "Alpha".to_string(),
                    profit: 295,
                    position: 0,
                    trades: 2,
                    errors: 0,
                },
                ScoreRecord {
                    team: "Beta".to_string(),
                    profit: -40,
                    position: 3,
                    trades: 1,
                    errors: 2,
                },
            ])
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "team,profit,final_position,trades,errors\nAlpha,295,0,2,0\nBeta,-40,3,1,2\n"
        );
    }
}
