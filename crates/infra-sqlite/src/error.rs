// sqlx::Error -> AppError

use courier_core::error::AppError;

/// Convert sqlx errors, keeping SQLite result codes that matter to operators
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // https://www.sqlite.org/rescode.html
            match db_err.code().as_deref() {
                Some("2067") | Some("1555") => {
                    AppError::Conflict(format!("Unique constraint violation: {}", db_err.message()))
                }
                Some("787") => AppError::Storage(format!(
                    "Foreign key constraint violation: {}",
                    db_err.message()
                )),
                Some("5") => AppError::Storage(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                Some("13") => AppError::Storage(format!("Database full: {}", db_err.message())),
                Some(code) => {
                    AppError::Storage(format!("Database error [{}]: {}", code, db_err.message()))
                }
                None => AppError::Storage(format!("Database error: {}", db_err.message())),
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("row".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Storage(format!("Column not found: {}", col))
        }
        _ => AppError::Storage(err.to_string()),
    }
}
