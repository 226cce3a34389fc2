use crate::gradebook::{GradeItemLookup, GradeType, Gradebook};
use async_trait::async_trait;
use lms_external_functions::{
    AccessMode, ExternalFunction, FunctionDescriptor, FunctionError, ParamKind, ReturnShape,
    SchemaField, ValidatedParams,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Audit source recorded with every grade item write made by this function.
const UPDATE_SOURCE: &str = "external";

/// `core_grades_update_grade_item`: switch a grade item to scale grading.
///
/// Order of effects: resolve item → resolve scale → persist → regrade → re-read. Every lookup
/// completes before the first write, and the course is only regraded after the item change
/// is stored.
pub struct UpdateGradeItem {
    descriptor: FunctionDescriptor,
    gradebook: Arc<dyn Gradebook>,
}

impl UpdateGradeItem {
    #[must_use]
    pub fn new(gradebook: Arc<dyn Gradebook>) -> Self {
        Self {
            descriptor: descriptor(),
            gradebook,
        }
    }
}

fn descriptor() -> FunctionDescriptor {
    FunctionDescriptor {
        name: "core_grades_update_grade_item".to_string(),
        method_name: "update_grade_item".to_string(),
        description: "Updates grade item by the id or course id".to_string(),
        access: AccessMode::Write,
        parameters: vec![
            SchemaField::required("scaleid", ParamKind::Int, "id of the scale"),
            SchemaField::required("courseid", ParamKind::Int, "id of the course"),
            SchemaField::optional("gradeitemid", ParamKind::Int, "id of the grade item"),
        ],
        returns: ReturnShape::single(vec![
            SchemaField::required("gradeitemid", ParamKind::Int, "grade item id"),
            SchemaField::required("scaleid", ParamKind::Int, "scale id"),
            SchemaField::required("courseid", ParamKind::Int, "course id"),
            SchemaField::required("timemodified", ParamKind::Int, "timestamp"),
        ]),
    }
}

fn read_error(e: impl std::fmt::Display) -> FunctionError {
    FunctionError::DataAccess(e.to_string())
}

#[async_trait]
impl ExternalFunction for UpdateGradeItem {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    async fn call(&self, params: ValidatedParams) -> lms_external_functions::error::Result<Value> {
        let scale_id = params.int("scaleid")?;
        let course_id = params.int("courseid")?;
        let lookup = GradeItemLookup::new(course_id, params.opt_int("gradeitemid")?);

        let mut item = self
            .gradebook
            .fetch_grade_item(lookup)
            .await
            .map_err(read_error)?
            .ok_or(match lookup {
                GradeItemLookup::ById { id, .. } => FunctionError::NotFound {
                    what: "grade item",
                    id,
                },
                GradeItemLookup::ByCourse { course_id } => FunctionError::NotFound {
                    what: "course grade item for course",
                    id: course_id,
                },
            })?;

        let scale = self
            .gradebook
            .fetch_scale(scale_id)
            .await
            .map_err(read_error)?
            .ok_or(FunctionError::NotFound {
                what: "scale",
                id: scale_id,
            })?;

        let labels = scale.load_items();
        debug!(grade_item_id = item.id, scale_id, labels = ?labels, "attaching scale");
        item.grade_type = GradeType::Scale;
        item.scale_id = Some(scale.id);
        item.scale = Some(scale);

        let stored = self
            .gradebook
            .update_grade_item(&item, UPDATE_SOURCE)
            .await
            .map_err(|e| {
                warn!(grade_item_id = item.id, error = %e, "grade item write rejected");
                FunctionError::Persistence(e.to_string())
            })?;
        if !stored {
            return Err(FunctionError::Operation(
                "Grade item update resulted in an error".to_string(),
            ));
        }

        // The item change is already stored; a failed regrade is reported, not rolled back.
        self.gradebook
            .regrade_final_grades(item.course_id)
            .await
            .map_err(|e| {
                warn!(course_id = item.course_id, error = %e, "regrade failed after grade item update");
                FunctionError::Operation(format!(
                    "grade item {} updated but course regrade failed: {e}",
                    item.id
                ))
            })?;

        let updated = self
            .gradebook
            .fetch_grade_item_by_id(item.id)
            .await
            .map_err(read_error)?
            .ok_or_else(|| {
                FunctionError::Operation(format!("grade item {} vanished after update", item.id))
            })?;
        let stored_scale_id = updated.scale_id.ok_or_else(|| {
            FunctionError::Operation(format!("grade item {} has no scale after update", updated.id))
        })?;
        let stored_scale = self
            .gradebook
            .fetch_scale(stored_scale_id)
            .await
            .map_err(read_error)?
            .ok_or_else(|| {
                FunctionError::Operation(format!(
                    "grade item {} references missing scale {stored_scale_id}",
                    updated.id
                ))
            })?;

        info!(
            grade_item_id = updated.id,
            course_id = updated.course_id,
            scale_id = stored_scale.id,
            "grade item switched to scale grading"
        );

        Ok(json!({
            "gradeitemid": updated.id,
            "scaleid": stored_scale.id,
            "courseid": updated.course_id,
            "timemodified": updated.time_modified,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::tests::seeded_database;
    use crate::error::StoreError;
    use crate::gradebook::{GradeItem, GradeScale, SqlGradebook};
    use lms_external_functions::FunctionRegistry;
    use parking_lot::Mutex;
    use serde_json::Map;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    fn registry_for(gradebook: Arc<dyn Gradebook>) -> FunctionRegistry {
        FunctionRegistry::new([
            Arc::new(UpdateGradeItem::new(gradebook)) as Arc<dyn ExternalFunction>
        ])
        .expect("registry")
    }

    async fn sql_registry() -> FunctionRegistry {
        let db: Arc<dyn Database> = Arc::new(seeded_database().await);
        registry_for(Arc::new(SqlGradebook::new(db)))
    }

    #[tokio::test]
    async fn course_item_is_switched_to_scale() {
        let registry = sql_registry().await;
        let v = registry
            .call("update_grade_item", &args(json!({"scaleid": 5, "courseid": 10})))
            .await
            .expect("update");
        assert_eq!(v["gradeitemid"], json!(42));
        assert_eq!(v["scaleid"], json!(5));
        assert_eq!(v["courseid"], json!(10));
        assert!(v["timemodified"].as_i64().expect("timemodified") >= 1_650_000_000);
    }

    #[tokio::test]
    async fn explicit_item_must_belong_to_course() {
        let registry = sql_registry().await;
        let v = registry
            .call(
                "core_grades_update_grade_item",
                &args(json!({"scaleid": "5", "courseid": "10", "gradeitemid": "43"})),
            )
            .await
            .expect("update");
        assert_eq!(v["gradeitemid"], json!(43));

        let err = registry
            .call(
                "update_grade_item",
                &args(json!({"scaleid": 5, "courseid": 11, "gradeitemid": 43})),
            )
            .await
            .expect_err("item 43 is not in course 11");
        assert!(matches!(err, FunctionError::NotFound { what: "grade item", id: 43 }));
    }

    #[tokio::test]
    async fn repeated_update_is_stable_and_time_never_decreases() {
        let registry = sql_registry().await;
        let a = args(json!({"scaleid": 5, "courseid": 10}));
        let first = registry.call("update_grade_item", &a).await.expect("first");
        let second = registry.call("update_grade_item", &a).await.expect("second");
        for k in ["gradeitemid", "scaleid", "courseid"] {
            assert_eq!(first[k], second[k]);
        }
        assert!(second["timemodified"].as_i64() >= first["timemodified"].as_i64());
    }

    /// Fake gradebook recording every call, with switchable failures.
    #[derive(Default)]
    struct RecordingGradebook {
        calls: Mutex<Vec<String>>,
        reject_write: bool,
        fail_regrade: bool,
        stored: Mutex<Option<GradeItem>>,
    }

    impl RecordingGradebook {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn course_item() -> GradeItem {
            GradeItem {
                id: 42,
                course_id: 10,
                item_type: "course".to_string(),
                item_name: None,
                grade_type: GradeType::Value,
                scale_id: None,
                time_created: Some(100),
                time_modified: Some(100),
                scale: None,
            }
        }
    }

    #[async_trait]
    impl Gradebook for RecordingGradebook {
        async fn fetch_grade_item(
            &self,
            lookup: GradeItemLookup,
        ) -> crate::error::Result<Option<GradeItem>> {
            self.calls.lock().push(format!("fetch_grade_item {lookup:?}"));
            Ok(matches!(lookup, GradeItemLookup::ByCourse { course_id: 10 })
                .then(Self::course_item))
        }

        async fn fetch_grade_item_by_id(&self, id: i64) -> crate::error::Result<Option<GradeItem>> {
            self.calls.lock().push(format!("fetch_grade_item_by_id {id}"));
            Ok(self.stored.lock().clone())
        }

        async fn fetch_scale(&self, id: i64) -> crate::error::Result<Option<GradeScale>> {
            self.calls.lock().push(format!("fetch_scale {id}"));
            Ok((id == 5).then(|| GradeScale {
                id: 5,
                course_id: 0,
                name: "Competence".to_string(),
                scale: "Poor,Good".to_string(),
            }))
        }

        async fn update_grade_item(&self, item: &GradeItem, source: &str) -> crate::error::Result<bool> {
            self.calls.lock().push(format!("update_grade_item {} {source}", item.id));
            if self.reject_write {
                return Err(StoreError::Query("constraint violation".to_string()));
            }
            let mut stored = item.clone();
            stored.time_modified = Some(200);
            stored.scale = None;
            *self.stored.lock() = Some(stored);
            Ok(true)
        }

        async fn regrade_final_grades(&self, course_id: i64) -> crate::error::Result<()> {
            self.calls.lock().push(format!("regrade_final_grades {course_id}"));
            if self.fail_regrade {
                return Err(StoreError::Unavailable("grading engine offline".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn persists_before_regrading_then_rereads() {
        let gb = Arc::new(RecordingGradebook::default());
        let v = registry_for(gb.clone())
            .call("update_grade_item", &args(json!({"scaleid": 5, "courseid": 10})))
            .await
            .expect("update");
        assert_eq!(
            v,
            json!({"gradeitemid": 42, "scaleid": 5, "courseid": 10, "timemodified": 200})
        );
        assert_eq!(
            gb.calls(),
            vec![
                "fetch_grade_item ByCourse { course_id: 10 }",
                "fetch_scale 5",
                "update_grade_item 42 external",
                "regrade_final_grades 10",
                "fetch_grade_item_by_id 42",
                "fetch_scale 5",
            ]
        );
    }

    #[tokio::test]
    async fn missing_scale_fails_without_any_write() {
        let gb = Arc::new(RecordingGradebook::default());
        let err = registry_for(gb.clone())
            .call("update_grade_item", &args(json!({"scaleid": 999, "courseid": 10})))
            .await
            .expect_err("scale 999 missing");
        assert!(matches!(err, FunctionError::NotFound { what: "scale", id: 999 }));
        assert!(
            gb.calls()
                .iter()
                .all(|c| !c.starts_with("update_grade_item") && !c.starts_with("regrade"))
        );
    }

    #[tokio::test]
    async fn missing_course_item_is_not_found() {
        let gb = Arc::new(RecordingGradebook::default());
        let err = registry_for(gb.clone())
            .call("update_grade_item", &args(json!({"scaleid": 5, "courseid": 77})))
            .await
            .expect_err("no course item");
        assert!(matches!(err, FunctionError::NotFound { id: 77, .. }));
        assert_eq!(gb.calls().len(), 1);
    }

    #[tokio::test]
    async fn rejected_write_is_a_persistence_error_and_skips_regrade() {
        let gb = Arc::new(RecordingGradebook {
            reject_write: true,
            ..RecordingGradebook::default()
        });
        let err = registry_for(gb.clone())
            .call("update_grade_item", &args(json!({"scaleid": 5, "courseid": 10})))
            .await
            .expect_err("write rejected");
        assert!(matches!(err, FunctionError::Persistence(_)));
        assert!(!gb.calls().iter().any(|c| c.starts_with("regrade")));
    }

    #[tokio::test]
    async fn failed_regrade_is_an_operation_error_after_persist() {
        let gb = Arc::new(RecordingGradebook {
            fail_regrade: true,
            ..RecordingGradebook::default()
        });
        let err = registry_for(gb.clone())
            .call("update_grade_item", &args(json!({"scaleid": 5, "courseid": 10})))
            .await
            .expect_err("regrade failed");
        assert!(matches!(err, FunctionError::Operation(ref m) if m.contains("regrade")));
        assert!(gb.stored.lock().is_some());
    }

    #[tokio::test]
    async fn missing_required_scale_never_touches_gradebook() {
        let gb = Arc::new(RecordingGradebook::default());
        let err = registry_for(gb.clone())
            .call("update_grade_item", &args(json!({"courseid": 10})))
            .await
            .expect_err("scaleid missing");
        assert!(matches!(err, FunctionError::MissingParameter { ref name } if name == "scaleid"));
        assert!(gb.calls().is_empty());
    }
}
