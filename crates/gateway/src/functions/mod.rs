//! The external functions exposed by the gateway.

mod grade_item;
mod user_logs;

pub use grade_item::UpdateGradeItem;
pub use user_logs::GetUserLogs;

use crate::db::Database;
use crate::gradebook::Gradebook;
use lms_external_functions::{ExternalFunction, FunctionRegistry, RegistryError};
use std::sync::Arc;

/// Register every built-in function against the given capabilities.
///
/// # Errors
///
/// Returns an error if two built-ins collide on a name (a programming error).
pub fn builtin_registry(
    db: Arc<dyn Database>,
    gradebook: Arc<dyn Gradebook>,
) -> Result<FunctionRegistry, RegistryError> {
    FunctionRegistry::new([
        Arc::new(GetUserLogs::new(db)) as Arc<dyn ExternalFunction>,
        Arc::new(UpdateGradeItem::new(gradebook)) as Arc<dyn ExternalFunction>,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::seeded_database;
    use crate::gradebook::SqlGradebook;
    use lms_external_functions::AccessMode;

    #[tokio::test]
    async fn builtins_register_with_expected_access_modes() {
        let db: Arc<dyn Database> = Arc::new(seeded_database().await);
        let registry =
            builtin_registry(db.clone(), Arc::new(SqlGradebook::new(db))).expect("registry");
        let listed: Vec<(&str, &str, AccessMode)> = registry
            .list()
            .iter()
            .map(|d| (d.name.as_str(), d.method_name.as_str(), d.access))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("core_user_get_user_logs", "get_user_logs", AccessMode::Read),
                (
                    "core_grades_update_grade_item",
                    "update_grade_item",
                    AccessMode::Write
                ),
            ]
        );
    }
}
