//! Grading subsystem capability.
//!
//! The gateway never computes grades. It reads and writes grade item rows and asks the grading
//! subsystem to regrade a course; [`SqlGradebook`] implements that contract over the host
//! `grade_items` / `scale` tables.

use crate::db::{Database, Record, SqlParam};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// How to find the grade item a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeItemLookup {
    /// The course's aggregate ("course") item.
    ByCourse { course_id: i64 },
    /// An exact item, which must belong to the course.
    ById { id: i64, course_id: i64 },
}

impl GradeItemLookup {
    /// `None` or `Some(0)` selects the course item.
    #[must_use]
    pub fn new(course_id: i64, grade_item_id: Option<i64>) -> Self {
        match grade_item_id {
            Some(id) if id != 0 => Self::ById { id, course_id },
            _ => Self::ByCourse { course_id },
        }
    }

    #[must_use]
    pub fn course_id(&self) -> i64 {
        match *self {
            Self::ByCourse { course_id } | Self::ById { course_id, .. } => course_id,
        }
    }
}

/// Grade type codes as stored in `grade_items.gradetype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeType {
    None,
    Value,
    Scale,
    Text,
}

impl GradeType {
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Value => 1,
            Self::Scale => 2,
            Self::Text => 3,
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Value),
            2 => Some(Self::Scale),
            3 => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    pub id: i64,
    pub course_id: i64,
    pub name: String,
    /// Comma-separated labels, lowest first.
    pub scale: String,
}

impl GradeScale {
    /// Ordered scale labels.
    #[must_use]
    pub fn load_items(&self) -> Vec<String> {
        self.scale
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeItem {
    pub id: i64,
    pub course_id: i64,
    pub item_type: String,
    pub item_name: Option<String>,
    pub grade_type: GradeType,
    pub scale_id: Option<i64>,
    pub time_created: Option<i64>,
    pub time_modified: Option<i64>,
    /// Loaded scale, when attached in memory. Not persisted.
    pub scale: Option<GradeScale>,
}

#[async_trait]
pub trait Gradebook: Send + Sync {
    async fn fetch_grade_item(&self, lookup: GradeItemLookup) -> Result<Option<GradeItem>>;

    async fn fetch_grade_item_by_id(&self, id: i64) -> Result<Option<GradeItem>>;

    async fn fetch_scale(&self, id: i64) -> Result<Option<GradeScale>>;

    /// Persist grade type, scale and modification time. Returns `false` if no row matched.
    ///
    /// `source` names the caller for the grading subsystem's audit trail.
    async fn update_grade_item(&self, item: &GradeItem, source: &str) -> Result<bool>;

    /// Ask the grading subsystem to recompute every final grade in the course.
    async fn regrade_final_grades(&self, course_id: i64) -> Result<()>;
}

// Only the columns the gradebook reads: host tables carry NUMERIC columns (`grademax`,
// `grademin`, ...) that the `Any` driver cannot decode.
const GRADE_ITEM_BY_COURSE_SQL: &str = "SELECT id, courseid, itemtype, itemname, gradetype, scaleid, timecreated, timemodified \
     FROM {grade_items} WHERE courseid = ? AND itemtype = ?";
const GRADE_ITEM_IN_COURSE_SQL: &str = "SELECT id, courseid, itemtype, itemname, gradetype, scaleid, timecreated, timemodified \
     FROM {grade_items} WHERE id = ? AND courseid = ?";
const GRADE_ITEM_BY_ID_SQL: &str = "SELECT id, courseid, itemtype, itemname, gradetype, scaleid, timecreated, timemodified \
     FROM {grade_items} WHERE id = ?";
const SCALE_BY_ID_SQL: &str = "SELECT id, courseid, name, scale FROM {scale} WHERE id = ?";

/// [`Gradebook`] over the host tables, reached through a [`Database`].
///
/// Regrading flags every item of the course with `needsupdate = 1`; the host grading engine
/// recomputes flagged items.
pub struct SqlGradebook {
    db: Arc<dyn Database>,
}

impl SqlGradebook {
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Gradebook for SqlGradebook {
    async fn fetch_grade_item(&self, lookup: GradeItemLookup) -> Result<Option<GradeItem>> {
        let row = match lookup {
            GradeItemLookup::ByCourse { course_id } => {
                self.db
                    .get_record_sql(
                        GRADE_ITEM_BY_COURSE_SQL,
                        &[SqlParam::Int(course_id), SqlParam::from("course")],
                    )
                    .await?
            }
            GradeItemLookup::ById { id, course_id } => {
                self.db
                    .get_record_sql(
                        GRADE_ITEM_IN_COURSE_SQL,
                        &[SqlParam::Int(id), SqlParam::Int(course_id)],
                    )
                    .await?
            }
        };
        row.as_ref().map(grade_item_from_record).transpose()
    }

    async fn fetch_grade_item_by_id(&self, id: i64) -> Result<Option<GradeItem>> {
        self.db
            .get_record_sql(GRADE_ITEM_BY_ID_SQL, &[SqlParam::Int(id)])
            .await?
            .as_ref()
            .map(grade_item_from_record)
            .transpose()
    }

    async fn fetch_scale(&self, id: i64) -> Result<Option<GradeScale>> {
        self.db
            .get_record_sql(SCALE_BY_ID_SQL, &[SqlParam::Int(id)])
            .await?
            .as_ref()
            .map(scale_from_record)
            .transpose()
    }

    async fn update_grade_item(&self, item: &GradeItem, source: &str) -> Result<bool> {
        // Never move the modification time backwards.
        let now = now_unix_secs().max(item.time_modified.unwrap_or(0));
        debug!(grade_item_id = item.id, source, "persisting grade item");
        let n = self
            .db
            .execute(
                "UPDATE {grade_items} SET gradetype = ?, scaleid = ?, timemodified = ? WHERE id = ?",
                &[
                    SqlParam::Int(item.grade_type.code()),
                    SqlParam::from(item.scale_id),
                    SqlParam::Int(now),
                    SqlParam::Int(item.id),
                ],
            )
            .await?;
        Ok(n > 0)
    }

    async fn regrade_final_grades(&self, course_id: i64) -> Result<()> {
        let n = self
            .db
            .execute(
                "UPDATE {grade_items} SET needsupdate = ? WHERE courseid = ?",
                &[SqlParam::Int(1), SqlParam::Int(course_id)],
            )
            .await?;
        debug!(course_id, flagged_items = n, "course flagged for regrade");
        Ok(())
    }
}

fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn req_i64(rec: &Record, col: &str) -> Result<i64> {
    rec.get(col)
        .and_then(Value::as_i64)
        .ok_or_else(|| StoreError::Decode(format!("column '{col}' missing or not an integer")))
}

fn opt_i64(rec: &Record, col: &str) -> Option<i64> {
    rec.get(col).and_then(Value::as_i64)
}

fn opt_str(rec: &Record, col: &str) -> Option<String> {
    rec.get(col).and_then(Value::as_str).map(str::to_string)
}

fn grade_item_from_record(rec: &Record) -> Result<GradeItem> {
    let code = req_i64(rec, "gradetype")?;
    let grade_type = GradeType::from_code(code)
        .ok_or_else(|| StoreError::Decode(format!("unknown gradetype {code}")))?;
    Ok(GradeItem {
        id: req_i64(rec, "id")?,
        course_id: req_i64(rec, "courseid")?,
        item_type: opt_str(rec, "itemtype").unwrap_or_default(),
        item_name: opt_str(rec, "itemname"),
        grade_type,
        scale_id: opt_i64(rec, "scaleid"),
        time_created: opt_i64(rec, "timecreated"),
        time_modified: opt_i64(rec, "timemodified"),
        scale: None,
    })
}

fn scale_from_record(rec: &Record) -> Result<GradeScale> {
    Ok(GradeScale {
        id: req_i64(rec, "id")?,
        course_id: opt_i64(rec, "courseid").unwrap_or(0),
        name: opt_str(rec, "name").unwrap_or_default(),
        scale: opt_str(rec, "scale").unwrap_or_default(),
    })
}
