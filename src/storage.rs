use crate::error::AppError;
use crate::models::DailyUsage;
use chrono::NaiveDate;
use rusqlite::{params, types::Type, Connection, Row};
use serde::Serialize;
use std::path::Path;

pub struct Storage {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub project_ref: String,
    #[serde(flatten)]
    pub usage: DailyUsage,
}

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        let this = Self { conn };
        this.init()?;
        Ok(this)
    }

    fn init(&self) -> Result<(), AppError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS daily_usage (
                id INTEGER PRIMARY KEY,
                project_ref TEXT NOT NULL,
                date TEXT NOT NULL,
                metric TEXT NOT NULL,
                usage REAL NOT NULL,
                cost REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS daily_usage_project_date
                ON daily_usage (project_ref, date);
            "#,
        )?;
        Ok(())
    }

    pub fn replace_window(
        &mut self,
        project_ref: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[DailyUsage],
    ) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM daily_usage WHERE project_ref = ? AND date >= ? AND date <= ?",
            params![project_ref, start.to_string(), end.to_string()],
        )?;

        let mut insert = tx.prepare(
            "INSERT INTO daily_usage (project_ref, date, metric, usage, cost)
             VALUES (?, ?, ?, ?, ?)",
        )?;
        for r in rows.iter().filter(|r| r.date >= start && r.date <= end) {
            insert.execute(params![
                project_ref,
                r.date.to_string(),
                r.metric,
                r.usage,
                r.cost,
            ])?;
        }

        drop(insert);
        tx.commit()?;
        Ok(())
    }

    pub fn rows_between(
        &self,
        project_ref: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyUsage>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, metric, usage, cost FROM daily_usage
             WHERE project_ref = ? AND date >= ? AND date <= ?
             ORDER BY date ASC, metric ASC",
        )?;
        let rows = stmt
            .query_map(
                params![project_ref, start.to_string(), end.to_string()],
                |r| {
                    Ok(DailyUsage {
                        date: parse_date(r, 0)?,
                        metric: r.get(1)?,
                        usage: r.get(2)?,
                        cost: r.get(3)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn export_rows(&self, project_ref: Option<&str>) -> Result<Vec<ExportRow>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT project_ref, date, metric, usage, cost FROM daily_usage
             WHERE ?1 IS NULL OR project_ref = ?1
             ORDER BY project_ref ASC, date DESC, metric ASC",
        )?;
        let rows = stmt
            .query_map(params![project_ref], |r| {
                Ok(ExportRow {
                    project_ref: r.get(0)?,
                    usage: DailyUsage {
                        date: parse_date(r, 1)?,
                        metric: r.get(2)?,
                        usage: r.get(3)?,
                        cost: r.get(4)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn export_json(&self, project_ref: Option<&str>) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(&self.export_rows(project_ref)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid day")
    }

    fn sample(d: u32, metric: &str, usage: f64, cost: f64) -> DailyUsage {
        DailyUsage {
            date: day(d),
            metric: metric.to_string(),
            usage,
            cost,
        }
    }

    fn open(tmp: &TempDir) -> Storage {
        Storage::open(&tmp.path().join("usage.sqlite")).expect("open storage")
    }

    #[test]
    fn replace_window_replaces_rows_without_double_counting() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);

        storage
            .replace_window("abcd", day(1), day(7), &[sample(2, "egress", 10.0, 1.0)])
            .expect("first window");
        storage
            .replace_window("abcd", day(1), day(7), &[sample(3, "egress", 4.0, 0.4)])
            .expect("second window");

        let rows = storage.rows_between("abcd", day(1), day(31)).expect("rows");
        assert_eq!(rows, vec![sample(3, "egress", 4.0, 0.4)]);
    }

    #[test]
    fn replace_window_keeps_rows_outside_range_and_other_projects() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);

        storage
            .replace_window(
                "abcd",
                day(1),
                day(31),
                &[sample(5, "egress", 1.0, 0.1), sample(20, "egress", 2.0, 0.2)],
            )
            .expect("seed");
        storage
            .replace_window("efgh", day(1), day(31), &[sample(5, "storage", 9.0, 0.9)])
            .expect("seed other project");
        storage
            .replace_window("abcd", day(15), day(31), &[])
            .expect("clear second half");

        let rows = storage.rows_between("abcd", day(1), day(31)).expect("rows");
        assert_eq!(rows, vec![sample(5, "egress", 1.0, 0.1)]);
        assert_eq!(
            storage.rows_between("efgh", day(1), day(31)).expect("rows").len(),
            1
        );
    }

    #[test]
    fn rows_outside_requested_window_are_not_stored() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);
        storage
            .replace_window("abcd", day(1), day(2), &[sample(9, "egress", 1.0, 0.1)])
            .expect("replace");
        assert!(storage.export_rows(None).expect("export").is_empty());
    }

    #[test]
    fn export_json_filters_by_project() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = open(&tmp);
        storage
            .replace_window("abcd", day(1), day(7), &[sample(2, "egress", 3.0, 0.3)])
            .expect("seed");
        storage
            .replace_window("efgh", day(1), day(7), &[sample(2, "egress", 5.0, 0.5)])
            .expect("seed");

        let json = storage.export_json(Some("abcd")).expect("export json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        let arr = parsed.as_array().expect("array");
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["project_ref"], "abcd");
        assert_eq!(arr[0]["date"], "2024-01-02");
        assert_eq!(storage.export_rows(None).expect("all").len(), 2);
    }
}
