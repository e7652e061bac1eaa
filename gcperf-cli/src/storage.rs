//! 排名历史存储

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use gcperf_core::CollectorType;

/// 一次基准测试的排名记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingRecord {
    pub id: i64,
    /// 被测文件名
    pub file_name: String,
    /// 各收集器从 1 开始的名次，未参与排名为 `None`
    pub ranking_serial: Option<u8>,
    pub ranking_parallel: Option<u8>,
    pub ranking_g1: Option<u8>,
    pub ranking_zgc: Option<u8>,
    pub ranking_shenandoah: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl RankingRecord {
    pub fn rank_of(&self, collector: CollectorType) -> Option<u8> {
        match collector {
            CollectorType::Serial => self.ranking_serial,
            CollectorType::Parallel => self.ranking_parallel,
            CollectorType::G1 => self.ranking_g1,
            CollectorType::Zgc => self.ranking_zgc,
            CollectorType::Shenandoah => self.ranking_shenandoah,
        }
    }

    /// 按名次排列的收集器
    pub fn leaderboard(&self) -> Vec<CollectorType> {
        let mut ranked: Vec<(u8, CollectorType)> = CollectorType::ALL
            .into_iter()
            .filter_map(|c| self.rank_of(c).map(|rank| (rank, c)))
            .collect();
        ranked.sort();
        ranked.into_iter().map(|(_, c)| c).collect()
    }
}

/// 排名存储接口
pub trait RankingStore: Send + Sync {
    /// 存储一次基准测试的排行榜
    fn insert_ranking(
        &self,
        created_at: DateTime<Utc>,
        file_name: &str,
        leaderboard: &[CollectorType],
    ) -> Result<i64>;

    /// 全部记录，按创建时间排序
    fn query_rankings(&self) -> Result<Vec<RankingRecord>>;

    /// 某个被测文件最近的记录
    fn latest_for(&self, file_name: &str) -> Result<Option<RankingRecord>>;
}

/// SQLite排名存储实现
pub struct SqliteRankingStore {
    connection: Mutex<Connection>,
}

impl SqliteRankingStore {
    /// 打开（必要时创建）数据库文件
    pub fn open(database_path: &Path) -> Result<Self> {
        let connection = Connection::open(database_path)?;
        Self::create_tables(&connection)?;
        log::debug!("Opened ranking database {}", database_path.display());
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// 内存数据库
    pub fn in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Self::create_tables(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS stats (
                stat_id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                ranking_serial INTEGER,
                ranking_parallel INTEGER,
                ranking_g1 INTEGER,
                ranking_zgc INTEGER,
                ranking_shenandoah INTEGER,
                date_created TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_stats_file_name ON stats(file_name)",
            [],
        )?;

        Ok(())
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<RankingRecord> {
        let created: String = row.get(7)?;
        let created_at = DateTime::parse_from_rfc3339(&created)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(RankingRecord {
            id: row.get(0)?,
            file_name: row.get(1)?,
            ranking_serial: row.get(2)?,
            ranking_parallel: row.get(3)?,
            ranking_g1: row.get(4)?,
            ranking_zgc: row.get(5)?,
            ranking_shenandoah: row.get(6)?,
            created_at,
        })
    }
}

impl RankingStore for SqliteRankingStore {
    fn insert_ranking(
        &self,
        created_at: DateTime<Utc>,
        file_name: &str,
        leaderboard: &[CollectorType],
    ) -> Result<i64> {
        let rank = |collector: CollectorType| -> Option<u8> {
            leaderboard
                .iter()
                .position(|&c| c == collector)
                .and_then(|idx| u8::try_from(idx + 1).ok())
        };

        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO stats
             (file_name, ranking_serial, ranking_parallel, ranking_g1, ranking_zgc,
              ranking_shenandoah, date_created)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                file_name,
                rank(CollectorType::Serial),
                rank(CollectorType::Parallel),
                rank(CollectorType::G1),
                rank(CollectorType::Zgc),
                rank(CollectorType::Shenandoah),
                created_at.to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        log::info!("Stored ranking #{id} for {file_name}: {leaderboard:?}");
        Ok(id)
    }

    fn query_rankings(&self) -> Result<Vec<RankingRecord>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(
            "SELECT stat_id, file_name, ranking_serial, ranking_parallel, ranking_g1,
                    ranking_zgc, ranking_shenandoah, date_created
             FROM stats
             ORDER BY date_created, stat_id",
        )?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn latest_for(&self, file_name: &str) -> Result<Option<RankingRecord>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(
            "SELECT stat_id, file_name, ranking_serial, ranking_parallel, ranking_g1,
                    ranking_zgc, ranking_shenandoah, date_created
             FROM stats
             WHERE file_name = ?
             ORDER BY date_created DESC, stat_id DESC
             LIMIT 1",
        )?;
        let record = stmt
            .query_row(params![file_name], Self::row_to_record)
            .optional()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_store_round_trip() -> Result<()> {
        let temp_dir = tempdir()?;
        let store = SqliteRankingStore::open(&temp_dir.path().join("stats.db"))?;

        let created_at = Utc::now();
        store.insert_ranking(
            created_at,
            "App.class",
            &[CollectorType::G1, CollectorType::Serial, CollectorType::Zgc],
        )?;

        let records = store.query_rankings()?;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.file_name, "App.class");
        assert_eq!(record.ranking_g1, Some(1));
        assert_eq!(record.ranking_serial, Some(2));
        assert_eq!(record.ranking_zgc, Some(3));
        assert_eq!(record.ranking_parallel, None);
        assert_eq!(record.ranking_shenandoah, None);
        assert_eq!(
            record.leaderboard(),
            vec![CollectorType::G1, CollectorType::Serial, CollectorType::Zgc]
        );

        Ok(())
    }

    #[test]
    fn test_latest_for_file() -> Result<()> {
        let store = SqliteRankingStore::in_memory()?;
        let earlier = Utc::now() - chrono::Duration::hours(1);
        store.insert_ranking(earlier, "App.jar", &[CollectorType::Serial])?;
        store.insert_ranking(Utc::now(), "App.jar", &[CollectorType::Parallel])?;
        store.insert_ranking(Utc::now(), "Other.class", &[CollectorType::G1])?;

        let latest = store.latest_for("App.jar")?;
        assert_eq!(
            latest.map(|r| r.leaderboard()),
            Some(vec![CollectorType::Parallel])
        );
        assert!(store.latest_for("Missing.class")?.is_none());
        assert_eq!(store.query_rankings()?.len(), 3);
        Ok(())
    }
}
