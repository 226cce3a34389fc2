use crate::db::{Database, SqlParam};
use async_trait::async_trait;
use lms_external_functions::{
    AccessMode, ExternalFunction, FunctionDescriptor, FunctionError, ParamKind, ReturnShape,
    SchemaField, ValidatedParams,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

const USER_COURSE_LOGS_SQL: &str = "SELECT id, relateduserid, contextid, component, eventname, target, action, \
     objecttable, objectid, timecreated \
     FROM {logstore_standard_log} WHERE courseid = ? AND userid = ? ORDER BY id DESC";

/// `core_user_get_user_logs`: a user's log records within one course, newest first.
pub struct GetUserLogs {
    descriptor: FunctionDescriptor,
    db: Arc<dyn Database>,
}

impl GetUserLogs {
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            descriptor: descriptor(),
            db,
        }
    }
}

fn descriptor() -> FunctionDescriptor {
    FunctionDescriptor {
        name: "core_user_get_user_logs".to_string(),
        method_name: "get_user_logs".to_string(),
        description: "Returns logs for the given user specified by id per given course id"
            .to_string(),
        access: AccessMode::Read,
        parameters: vec![
            SchemaField::required("userid", ParamKind::Int, "id of the user"),
            SchemaField::required("courseid", ParamKind::Int, "id of the course"),
        ],
        returns: ReturnShape::multiple(ReturnShape::single(vec![
            SchemaField::required("id", ParamKind::Int, "log id"),
            SchemaField::required("relateduserid", ParamKind::Int, "affected user id").nullable(),
            SchemaField::required("contextid", ParamKind::Int, "event context id"),
            SchemaField::required("component", ParamKind::Text, "component"),
            SchemaField::required("eventname", ParamKind::Text, "event name"),
            SchemaField::required("target", ParamKind::Text, "target"),
            SchemaField::required("action", ParamKind::Text, "action"),
            SchemaField::required("objecttable", ParamKind::Text, "object table").nullable(),
            SchemaField::required("objectid", ParamKind::Text, "object id").nullable(),
            SchemaField::required("timecreated", ParamKind::Int, "time created"),
        ])),
    }
}

#[async_trait]
impl ExternalFunction for GetUserLogs {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    async fn call(&self, params: ValidatedParams) -> lms_external_functions::error::Result<Value> {
        let user_id = params.int("userid")?;
        let course_id = params.int("courseid")?;

        let records = self
            .db
            .get_records_sql(
                USER_COURSE_LOGS_SQL,
                &[SqlParam::Int(course_id), SqlParam::Int(user_id)],
            )
            .await
            .map_err(|e| {
                warn!(user_id, course_id, error = %e, "log query failed");
                FunctionError::DataAccess(e.to_string())
            })?;

        Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::seeded_database;
    use crate::db::Record;
    use crate::error::StoreError;
    use lms_external_functions::FunctionRegistry;
    use serde_json::{Map, json};

    async fn registry() -> FunctionRegistry {
        let db: Arc<dyn Database> = Arc::new(seeded_database().await);
        FunctionRegistry::new([Arc::new(GetUserLogs::new(db)) as Arc<dyn ExternalFunction>])
            .expect("registry")
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn returns_course_logs_newest_first_with_declared_fields_only() {
        let registry = registry().await;
        let v = registry
            .call("get_user_logs", &args(json!({"userid": 3, "courseid": 10})))
            .await
            .expect("logs");
        let logs = v.as_array().expect("list");
        let ids: Vec<i64> = logs.iter().filter_map(|l| l["id"].as_i64()).collect();
        assert_eq!(ids, vec![4, 2, 1]);
        assert!(ids.windows(2).all(|w| w[0] >= w[1]));

        // objectid is declared as text; store columns outside the shape are dropped.
        assert_eq!(logs[1]["objectid"], json!("91"));
        assert_eq!(logs[0]["relateduserid"], json!(4));
        assert_eq!(logs[2]["objecttable"], Value::Null);
        assert!(logs[0].get("ip").is_none());
        assert!(logs[0].get("courseid").is_none());
    }

    #[tokio::test]
    async fn no_matching_records_is_an_empty_list() {
        let registry = registry().await;
        let v = registry
            .call(
                "core_user_get_user_logs",
                &args(json!({"userid": 3, "courseid": 999})),
            )
            .await
            .expect("empty is not an error");
        assert_eq!(v, json!([]));
    }

    #[tokio::test]
    async fn non_numeric_user_is_rejected() {
        let registry = registry().await;
        let err = registry
            .call("get_user_logs", &args(json!({"userid": "me", "courseid": 10})))
            .await
            .expect_err("type mismatch");
        assert!(matches!(err, FunctionError::TypeMismatch { .. }));
    }

    struct DownDatabase;

    #[async_trait]
    impl Database for DownDatabase {
        async fn get_records_sql(
            &self,
            _sql: &str,
            _params: &[SqlParam],
        ) -> crate::error::Result<Vec<Record>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> crate::error::Result<u64> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn unreachable_store_is_a_data_access_error() {
        let f = GetUserLogs::new(Arc::new(DownDatabase));
        let registry =
            FunctionRegistry::new([Arc::new(f) as Arc<dyn ExternalFunction>]).expect("registry");
        let err = registry
            .call("get_user_logs", &args(json!({"userid": 3, "courseid": 10})))
            .await
            .expect_err("store down");
        assert!(matches!(err, FunctionError::DataAccess(ref m) if m.contains("connection refused")));
    }
}
